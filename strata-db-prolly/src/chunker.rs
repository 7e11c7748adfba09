//! Streaming tree construction.
//!
//! The chunker is fed key-value pairs in strictly ascending key order at
//! level 0. Each level buffers items until its rolling splitter fires (or a
//! hard cap is hit), then serializes the node, writes it to the store, and
//! emits a `(last key, meta value)` pair to the level above. `done` flushes
//! the tails bottom-up and collapses trivial single-child top levels into
//! the root.
//!
//! For any ordered input stream the output tree contains exactly the input
//! pairs, and the root hash depends only on the pairs and the splitter
//! parameters, not on how the stream was produced.

use crate::error::{Error, Result};
use crate::node::{MetaValue, Node, MAX_NODE_PAIRS, MAX_NODE_PAYLOAD};
use crate::splitter::RollingSplitter;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::cmp::Ordering;
use strata_db_core::{Cancellation, Hash, NodeStore, TupleDescriptor};
use tracing::trace;

/// One in-progress node at a single tree level.
#[derive(Debug)]
struct LevelBuilder {
    level: u8,
    items: Vec<Bytes>,
    payload: usize,
    splitter: RollingSplitter,
    /// Most recent node flushed out of this level, kept so a single-child
    /// top level can collapse into it at `done`.
    last_written: Option<(Node, Hash)>,
}

impl LevelBuilder {
    fn new(level: u8) -> Self {
        Self {
            level,
            items: Vec::new(),
            payload: 0,
            splitter: RollingSplitter::new(),
            last_written: None,
        }
    }

    fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    fn push(&mut self, key: Bytes, value: Bytes) {
        self.payload += key.len() + value.len();
        self.splitter.append(&key, &value);
        self.items.push(key);
        self.items.push(value);
    }

    fn fits(&self, extra: usize) -> bool {
        self.payload + extra <= MAX_NODE_PAYLOAD
    }

    fn at_boundary(&self) -> bool {
        self.splitter.should_split() || self.items.len() / 2 >= MAX_NODE_PAIRS
    }
}

/// Streaming builder producing a prolly tree from an ascending pair stream.
pub struct TreeChunker<'a> {
    store: &'a dyn NodeStore,
    key_desc: TupleDescriptor,
    cancel: Cancellation,
    /// Level builders, index = tree level; grows as boundaries propagate up.
    levels: Vec<LevelBuilder>,
    last_key: Option<Bytes>,
}

impl<'a> TreeChunker<'a> {
    pub fn new(store: &'a dyn NodeStore, key_desc: TupleDescriptor, cancel: &Cancellation) -> Self {
        Self {
            store,
            key_desc,
            cancel: cancel.clone(),
            levels: vec![LevelBuilder::new(0)],
            last_key: None,
        }
    }

    /// Append the next pair. Keys must be strictly ascending.
    pub async fn append(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        if let Some(prev) = &self.last_key {
            if self.key_desc.compare_bytes(prev, &key) != Ordering::Less {
                return Err(Error::invariant(
                    "chunker fed keys out of order (duplicate or descending)",
                ));
            }
        }
        self.last_key = Some(key.clone());
        self.append_at(0, key, value).await
    }

    fn append_at(&mut self, level: usize, key: Bytes, value: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.levels.len() == level {
                self.levels.push(LevelBuilder::new(level as u8));
            }
            let pair_len = key.len() + value.len();
            if pair_len > MAX_NODE_PAYLOAD {
                return Err(Error::invariant(format!(
                    "pair of {pair_len} bytes exceeds node capacity"
                )));
            }
            if !self.levels[level].fits(pair_len) && self.levels[level].has_items() {
                self.flush_level(level).await?;
            }
            self.levels[level].push(key, value);
            if self.levels[level].at_boundary() {
                self.flush_level(level).await?;
            }
            Ok(())
        })
    }

    /// Serialize and write the pending node at `level`, then emit its meta
    /// pair to the level above.
    fn flush_level(&mut self, level: usize) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (node_level, items) = {
                let lb = &mut self.levels[level];
                let items = std::mem::take(&mut lb.items);
                lb.payload = 0;
                lb.splitter.reset();
                (lb.level, items)
            };

            let node = Node::new(node_level, items)?;
            let Some(last_key) = node.last_key() else {
                return Err(Error::invariant("flushed an empty node"));
            };
            let meta_key = self.store.pool().copy(last_key).freeze();

            let bytes = node.encode()?;
            let hash = self.store.write(bytes, &self.cancel).await?;
            trace!(
                level,
                pairs = node.pair_count(),
                count = node.tree_count(),
                %hash,
                "wrote tree node"
            );

            let meta_val = MetaValue::new(node.tree_count(), hash).encode();
            self.levels[level].last_written = Some((node, hash));
            self.append_at(level + 1, meta_key, meta_val).await
        })
    }

    /// Flush all tails and return the root node and its hash.
    pub async fn done(mut self) -> Result<(Node, Hash)> {
        let mut level = 0;
        loop {
            let is_top = level + 1 == self.levels.len();
            if !is_top {
                if self.levels[level].has_items() {
                    self.flush_level(level).await?;
                }
                level += 1;
                continue;
            }

            // a top level holding a single meta pair is a trivial chain:
            // its only child is the root
            if level > 0 && self.levels[level].items.len() == 2 {
                return self.levels[level - 1]
                    .last_written
                    .take()
                    .ok_or_else(|| Error::invariant("single meta pair with no written child"));
            }

            let items = std::mem::take(&mut self.levels[level].items);
            let node = Node::new(level as u8, items)?;
            let bytes = node.encode()?;
            let hash = self.store.write(bytes, &self.cancel).await?;
            trace!(level, count = node.tree_count(), %hash, "wrote root node");
            return Ok((node, hash));
        }
    }
}
