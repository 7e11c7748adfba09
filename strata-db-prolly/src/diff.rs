//! Structural diff between two maps.
//!
//! The differ walks both trees subtree-by-subtree. While both sides sit
//! before child subtrees with the same content hash, the subtrees are
//! skipped by index arithmetic alone; no node is read for content the
//! trees share. Only differing children are descended into and compared
//! pair-wise, so the walk is linear in the size of the symmetric
//! difference, not the trees.

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::map::Map;
use std::cmp::Ordering;
use strata_db_core::{Cancellation, Tuple, TupleDescriptor};

/// What happened to a key between the `from` and `to` maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
}

/// One key's difference between two maps.
#[derive(Debug, Clone)]
pub struct Diff {
    pub key: Tuple,
    /// Value in the `from` map, `None` for additions.
    pub from: Option<Tuple>,
    /// Value in the `to` map, `None` for removals.
    pub to: Option<Tuple>,
    pub kind: DiffKind,
}

/// Streaming differ yielding [`Diff`]s in ascending key order.
pub struct TreeDiffer<'a> {
    inner: Option<DifferInner<'a>>,
}

struct DifferInner<'a> {
    key_desc: &'a TupleDescriptor,
    from: Cursor<'a>,
    to: Cursor<'a>,
}

impl<'a> TreeDiffer<'a> {
    /// Build a differ from `from` to `to`.
    ///
    /// Equal roots short-circuit to an empty stream without reading any
    /// nodes beyond the roots the maps already hold.
    pub(crate) async fn from_maps(
        from: &'a Map,
        to: &'a Map,
        cancel: &Cancellation,
    ) -> Result<TreeDiffer<'a>> {
        if from.hash_of() == to.hash_of() {
            return Ok(TreeDiffer { inner: None });
        }
        let key_desc = from.key_desc();
        let from_cur =
            Cursor::at_root(from.store_ref(), key_desc, from.root_node().clone(), cancel)?;
        let to_cur = Cursor::at_root(to.store_ref(), key_desc, to.root_node().clone(), cancel)?;
        Ok(TreeDiffer {
            inner: Some(DifferInner {
                key_desc,
                from: from_cur,
                to: to_cur,
            }),
        })
    }

    /// The next difference, or `None` when the streams are exhausted.
    pub async fn next(&mut self) -> Result<Option<Diff>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        inner.next().await
    }
}

impl DifferInner<'_> {
    async fn next(&mut self) -> Result<Option<Diff>> {
        loop {
            match (self.from.live(), self.to.live()) {
                (false, false) => return Ok(None),
                (true, false) => {
                    ensure_at_leaf(&mut self.from).await?;
                    return Ok(Some(take(&mut self.from, DiffKind::Removed)?));
                }
                (false, true) => {
                    ensure_at_leaf(&mut self.to).await?;
                    return Ok(Some(take(&mut self.to, DiffKind::Added)?));
                }
                (true, true) => {
                    if self.from.suspended() && self.to.suspended() {
                        self.align_or_descend().await?;
                        continue;
                    }
                    if self.from.suspended() {
                        self.from.descend_once().await?;
                        continue;
                    }
                    if self.to.suspended() {
                        self.to.descend_once().await?;
                        continue;
                    }
                    if let Some(diff) = self.compare_pairs()? {
                        return Ok(Some(diff));
                    }
                }
            }
        }
    }

    /// Both sides suspended: skip matching subtrees, align heights, or
    /// descend into a differing pair of children.
    async fn align_or_descend(&mut self) -> Result<()> {
        let (from_level, from_meta) = self.from.child_ref()?;
        let (to_level, to_meta) = self.to.child_ref()?;
        match from_level.cmp(&to_level) {
            // identical bytes hash identically, so an equal hash means an
            // equal subtree: skip it on both sides without reading it
            Ordering::Equal if from_meta.child == to_meta.child => {
                self.from.advance_subtree();
                self.to.advance_subtree();
            }
            Ordering::Equal => {
                self.from.descend_once().await?;
                self.to.descend_once().await?;
            }
            // unequal heights: step the taller side down
            Ordering::Greater => self.from.descend_once().await?,
            Ordering::Less => self.to.descend_once().await?,
        }
        Ok(())
    }

    /// Both sides positioned on leaf pairs: emit the next difference, or
    /// `None` after stepping past an unchanged pair.
    fn compare_pairs(&mut self) -> Result<Option<Diff>> {
        let (Some(from_key), Some(to_key)) = (self.from.current_key(), self.to.current_key())
        else {
            return Err(Error::invariant("live cursor lost its key"));
        };
        match self.key_desc.compare_bytes(from_key, to_key) {
            Ordering::Less => Ok(Some(take(&mut self.from, DiffKind::Removed)?)),
            Ordering::Greater => Ok(Some(take(&mut self.to, DiffKind::Added)?)),
            Ordering::Equal => {
                if self.from.current_value() != self.to.current_value() {
                    let (Some((key, from_val)), Some((_, to_val))) =
                        (self.from.current_pair(), self.to.current_pair())
                    else {
                        return Err(Error::invariant("live cursor lost its pair"));
                    };
                    step(&mut self.from);
                    step(&mut self.to);
                    return Ok(Some(Diff {
                        key: Tuple::from_bytes(key),
                        from: Some(Tuple::from_bytes(from_val)),
                        to: Some(Tuple::from_bytes(to_val)),
                        kind: DiffKind::Modified,
                    }));
                }
                step(&mut self.from);
                step(&mut self.to);
                Ok(None)
            }
        }
    }
}

/// Resume a suspended cursor down to its next leaf pair.
async fn ensure_at_leaf(cur: &mut Cursor<'_>) -> Result<()> {
    while cur.suspended() {
        cur.descend_once().await?;
    }
    Ok(())
}

/// Emit the cursor's current pair as a one-sided diff and step past it.
fn take(cur: &mut Cursor<'_>, kind: DiffKind) -> Result<Diff> {
    let Some((key, value)) = cur.current_pair() else {
        return Err(Error::invariant("live cursor lost its pair"));
    };
    step(cur);
    let value = Tuple::from_bytes(value);
    let (from, to) = match kind {
        DiffKind::Removed => (Some(value), None),
        DiffKind::Added => (None, Some(value)),
        DiffKind::Modified => {
            return Err(Error::invariant("one-sided diff cannot be a modification"))
        }
    };
    Ok(Diff {
        key: Tuple::from_bytes(key),
        from,
        to,
        kind,
    })
}

fn step(cur: &mut Cursor<'_>) {
    cur.step_in_leaf();
    if cur.leaf_consumed() {
        cur.advance_subtree();
    }
}

/// True if two diffs agree on their end state.
pub(crate) fn same_outcome(left: &Diff, right: &Diff) -> bool {
    left.kind == right.kind && left.to == right.to
}
