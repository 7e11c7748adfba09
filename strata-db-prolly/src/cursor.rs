//! Positioned navigation over a persistent tree.
//!
//! A cursor is an explicit stack of `(node, pair index)` frames from the
//! root down to the current leaf; nodes never hold parent pointers. The
//! frame API is slightly wider than plain iteration because the structural
//! differ advances whole subtrees at interior frames.

use crate::error::{Error, Result};
use crate::node::Node;
use bytes::Bytes;
use std::cmp::Ordering;
use strata_db_core::{Cancellation, Hash, NodeStore, TupleDescriptor};

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    node: Node,
    idx: usize,
}

/// A cursor over one tree. Invalidated by advancing past either end.
///
/// The cursor carries the caller's cancellation token into every node
/// fetch, so long walks unwind promptly when cancelled.
#[derive(Debug)]
pub struct Cursor<'a> {
    store: &'a dyn NodeStore,
    key_desc: &'a TupleDescriptor,
    cancel: Cancellation,
    /// Root at index 0, current leaf last.
    stack: Vec<Frame>,
}

impl<'a> Cursor<'a> {
    /// Position at the first pair of the tree.
    pub(crate) async fn at_start(
        store: &'a dyn NodeStore,
        key_desc: &'a TupleDescriptor,
        root: Node,
        cancel: &Cancellation,
    ) -> Result<Cursor<'a>> {
        let mut cur = Cursor {
            store,
            key_desc,
            cancel: cancel.clone(),
            stack: Vec::new(),
        };
        cur.push_leftmost(root).await?;
        Ok(cur)
    }

    /// Position at the last pair of the tree.
    pub(crate) async fn at_end(
        store: &'a dyn NodeStore,
        key_desc: &'a TupleDescriptor,
        root: Node,
        cancel: &Cancellation,
    ) -> Result<Cursor<'a>> {
        let mut cur = Cursor {
            store,
            key_desc,
            cancel: cancel.clone(),
            stack: Vec::new(),
        };
        let mut node = root;
        loop {
            if node.is_leaf() {
                let idx = node.pair_count().saturating_sub(1);
                cur.stack.push(Frame { node, idx });
                return Ok(cur);
            }
            let idx = check_internal(&node)? - 1;
            let meta = node.meta_value(idx)?;
            cur.stack.push(Frame { node, idx });
            node = cur.fetch(meta.child).await?;
        }
    }

    /// Position at the smallest pair with key >= `key`, or past-end.
    ///
    /// Internal nodes key each child by the largest key in its subtree, so
    /// descending into the first child with key >= target finds the
    /// containing subtree; past-the-maximum targets clamp to the rightmost
    /// path and surface as a past-end leaf position.
    pub(crate) async fn seek(
        store: &'a dyn NodeStore,
        key_desc: &'a TupleDescriptor,
        root: Node,
        key: &[u8],
        cancel: &Cancellation,
    ) -> Result<Cursor<'a>> {
        let mut cur = Cursor {
            store,
            key_desc,
            cancel: cancel.clone(),
            stack: Vec::new(),
        };
        let mut node = root;
        loop {
            if node.is_leaf() {
                let idx = lower_bound(key_desc, &node, key);
                cur.stack.push(Frame { node, idx });
                return Ok(cur);
            }
            let pairs = check_internal(&node)?;
            let idx = lower_bound(key_desc, &node, key).min(pairs - 1);
            let meta = node.meta_value(idx)?;
            cur.stack.push(Frame { node, idx });
            node = cur.fetch(meta.child).await?;
        }
    }

    async fn fetch(&self, hash: Hash) -> Result<Node> {
        let bytes = self.store.read(hash, &self.cancel).await?;
        Node::decode(bytes)
    }

    async fn push_leftmost(&mut self, root: Node) -> Result<()> {
        let mut node = root;
        loop {
            if node.is_leaf() {
                self.stack.push(Frame { node, idx: 0 });
                return Ok(());
            }
            check_internal(&node)?;
            let meta = node.meta_value(0)?;
            self.stack.push(Frame { node, idx: 0 });
            node = self.fetch(meta.child).await?;
        }
    }

    fn leaf(&self) -> Option<&Frame> {
        self.stack.last()
    }

    /// True if the cursor points at a pair.
    pub fn valid(&self) -> bool {
        match self.leaf() {
            Some(f) => f.idx < f.node.pair_count(),
            None => false,
        }
    }

    pub fn current_key(&self) -> Option<&[u8]> {
        let f = self.leaf()?;
        (f.idx < f.node.pair_count()).then(|| f.node.key(f.idx))
    }

    pub fn current_value(&self) -> Option<&[u8]> {
        let f = self.leaf()?;
        (f.idx < f.node.pair_count()).then(|| f.node.value(f.idx))
    }

    /// Current pair as owned (reference-counted) buffers.
    pub fn current_pair(&self) -> Option<(Bytes, Bytes)> {
        let f = self.leaf()?;
        (f.idx < f.node.pair_count()).then(|| (f.node.key_bytes(f.idx), f.node.value_bytes(f.idx)))
    }

    /// Compare the current key to `key`. `None` when invalid.
    pub fn compare_key(&self, key: &[u8]) -> Option<Ordering> {
        self.current_key().map(|k| self.key_desc.compare_bytes(k, key))
    }

    /// Step to the next pair. Returns false (and invalidates) at the end.
    pub async fn advance(&mut self) -> Result<bool> {
        if self.stack.is_empty() {
            return Ok(false);
        }
        let depth = self.stack.len() - 1;
        self.advance_frame(depth).await
    }

    /// Step to the previous pair. Returns false (and invalidates) at the
    /// start.
    pub async fn retreat(&mut self) -> Result<bool> {
        if self.stack.is_empty() {
            return Ok(false);
        }
        let depth = self.stack.len() - 1;
        self.retreat_frame(depth).await
    }

    /// Advance the frame at stack position `depth` one step, climbing on
    /// exhaustion and re-descending to the leftmost leaf underneath.
    async fn advance_frame(&mut self, depth: usize) -> Result<bool> {
        let mut d = depth;
        loop {
            let frame = &mut self.stack[d];
            if frame.idx + 1 < frame.node.pair_count() {
                frame.idx += 1;
                break;
            }
            if d == 0 {
                self.invalidate();
                return Ok(false);
            }
            d -= 1;
        }
        self.stack.truncate(d + 1);
        self.descend_to_leaf().await?;
        Ok(true)
    }

    async fn retreat_frame(&mut self, depth: usize) -> Result<bool> {
        let mut d = depth;
        loop {
            let frame = &mut self.stack[d];
            if frame.idx > 0 && frame.node.pair_count() > 0 {
                // a past-end leaf retreats onto its last pair
                frame.idx = frame.idx.min(frame.node.pair_count()) - 1;
                break;
            }
            if d == 0 {
                self.invalidate();
                return Ok(false);
            }
            d -= 1;
        }
        self.stack.truncate(d + 1);
        self.descend_to_leaf_rightmost().await?;
        Ok(true)
    }

    /// Park the leaf frame past its last pair.
    fn invalidate(&mut self) {
        if let Some(f) = self.stack.last_mut() {
            f.idx = f.node.pair_count();
        }
    }

    async fn descend_to_leaf(&mut self) -> Result<()> {
        loop {
            let Some(f) = self.stack.last() else {
                return Err(Error::invariant("cursor stack empty during descent"));
            };
            if f.node.is_leaf() {
                return Ok(());
            }
            let meta = f.node.meta_value(f.idx)?;
            let child = self.fetch(meta.child).await?;
            if !child.is_leaf() {
                check_internal(&child)?;
            }
            self.stack.push(Frame {
                node: child,
                idx: 0,
            });
        }
    }

    async fn descend_to_leaf_rightmost(&mut self) -> Result<()> {
        loop {
            let Some(f) = self.stack.last() else {
                return Err(Error::invariant("cursor stack empty during descent"));
            };
            if f.node.is_leaf() {
                return Ok(());
            }
            let meta = f.node.meta_value(f.idx)?;
            let child = self.fetch(meta.child).await?;
            let idx = if child.is_leaf() {
                child.pair_count().saturating_sub(1)
            } else {
                check_internal(&child)? - 1
            };
            self.stack.push(Frame { node: child, idx });
        }
    }

    // ------------------------------------------------------------------
    // Subtree-granular walking for the structural differ
    // ------------------------------------------------------------------
    //
    // The differ holds cursors in a second mode: "suspended" at an
    // internal frame, meaning the frame's current child subtree has not
    // been entered yet. Skipping a suspended subtree is pure index
    // arithmetic; no node is ever fetched for content that two trees
    // share.

    /// Cursor parked at the root, suspended before its first child (or
    /// positioned, if the root is a leaf).
    pub(crate) fn at_root(
        store: &'a dyn NodeStore,
        key_desc: &'a TupleDescriptor,
        root: Node,
        cancel: &Cancellation,
    ) -> Result<Cursor<'a>> {
        if !root.is_leaf() {
            check_internal(&root)?;
        }
        Ok(Cursor {
            store,
            key_desc,
            cancel: cancel.clone(),
            stack: vec![Frame { node: root, idx: 0 }],
        })
    }

    /// True if there are pairs left to visit (positioned or suspended).
    pub(crate) fn live(&self) -> bool {
        match self.stack.last() {
            None => false,
            Some(f) if f.node.is_leaf() => f.idx < f.node.pair_count(),
            Some(_) => true,
        }
    }

    /// True if parked at an internal frame, before its current child.
    pub(crate) fn suspended(&self) -> bool {
        matches!(self.stack.last(), Some(f) if !f.node.is_leaf())
    }

    /// The suspended frame's current child: `(child level, meta value)`.
    pub(crate) fn child_ref(&self) -> Result<(u8, crate::node::MetaValue)> {
        let Some(f) = self.stack.last() else {
            return Err(Error::invariant("child_ref on an exhausted cursor"));
        };
        if f.node.is_leaf() {
            return Err(Error::invariant("child_ref on a leaf frame"));
        }
        Ok((f.node.level() - 1, f.node.meta_value(f.idx)?))
    }

    /// Enter the suspended frame's current child, suspending one level
    /// deeper (or positioning, if the child is a leaf).
    pub(crate) async fn descend_once(&mut self) -> Result<()> {
        let (_, meta) = self.child_ref()?;
        let child = self.fetch(meta.child).await?;
        if !child.is_leaf() {
            check_internal(&child)?;
        }
        self.stack.push(Frame {
            node: child,
            idx: 0,
        });
        Ok(())
    }

    /// Skip the current subtree (suspended) or leave the current leaf
    /// (positioned), leaving the cursor suspended before the next sibling
    /// subtree, or exhausted. Never fetches.
    pub(crate) fn advance_subtree(&mut self) {
        if matches!(self.stack.last(), Some(f) if f.node.is_leaf()) {
            self.stack.pop();
        }
        loop {
            let Some(f) = self.stack.last_mut() else {
                return;
            };
            f.idx += 1;
            if f.idx < f.node.pair_count() {
                return;
            }
            self.stack.pop();
        }
    }

    /// Step to the next pair within the current leaf; the caller notices
    /// consumption via [`leaf_consumed`](Self::leaf_consumed).
    pub(crate) fn step_in_leaf(&mut self) {
        if let Some(f) = self.stack.last_mut() {
            debug_assert!(f.node.is_leaf());
            f.idx += 1;
        }
    }

    pub(crate) fn leaf_consumed(&self) -> bool {
        matches!(self.stack.last(), Some(f) if f.node.is_leaf() && f.idx >= f.node.pair_count())
    }
}

/// First pair index in `node` whose key is >= `key`.
fn lower_bound(kd: &TupleDescriptor, node: &Node, key: &[u8]) -> usize {
    let mut lo = 0usize;
    let mut hi = node.pair_count();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if kd.compare_bytes(node.key(mid), key) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Internal nodes must reference at least one child.
fn check_internal(node: &Node) -> Result<usize> {
    let pairs = node.pair_count();
    if pairs == 0 {
        return Err(Error::corrupt("internal node with no children"));
    }
    Ok(pairs)
}
