//! The immutable, content-addressed ordered map.

use crate::cursor::Cursor;
use crate::diff::{Diff, TreeDiffer};
use crate::error::{Error, Result};
use crate::mutable_map::MutableMap;
use crate::node::Node;
use crate::range::{Cut, Range};
use std::cmp::Ordering;
use std::sync::Arc;
use strata_db_core::{Cancellation, Hash, NodeStore, Tuple, TupleDescriptor};

/// An immutable ordered map of tuples backed by a prolly tree.
///
/// A map's identity is exactly its root hash: two maps with the same root
/// are observably identical. Maps are cheap to clone and freely shared;
/// mutation goes through [`Map::mutate`] and produces a new map, leaving
/// this one untouched.
#[derive(Debug, Clone)]
pub struct Map {
    root: Node,
    root_hash: Hash,
    key_desc: TupleDescriptor,
    val_desc: TupleDescriptor,
    store: Arc<dyn NodeStore>,
}

impl Map {
    /// Create an empty map, writing the canonical empty leaf to the store.
    pub async fn new_empty(
        store: Arc<dyn NodeStore>,
        key_desc: TupleDescriptor,
        val_desc: TupleDescriptor,
    ) -> Result<Map> {
        let root = Node::empty_leaf();
        let root_hash = store.write(root.encode()?, &Cancellation::new()).await?;
        Ok(Map {
            root,
            root_hash,
            key_desc,
            val_desc,
            store,
        })
    }

    /// Load a map from an existing root hash.
    pub async fn load(
        store: Arc<dyn NodeStore>,
        root_hash: Hash,
        key_desc: TupleDescriptor,
        val_desc: TupleDescriptor,
        cancel: &Cancellation,
    ) -> Result<Map> {
        let root = Node::decode(store.read(root_hash, cancel).await?)?;
        Ok(Map {
            root,
            root_hash,
            key_desc,
            val_desc,
            store,
        })
    }

    pub(crate) fn from_parts(
        root: Node,
        root_hash: Hash,
        key_desc: TupleDescriptor,
        val_desc: TupleDescriptor,
        store: Arc<dyn NodeStore>,
    ) -> Map {
        Map {
            root,
            root_hash,
            key_desc,
            val_desc,
            store,
        }
    }

    /// Number of key-value pairs.
    pub fn count(&self) -> u64 {
        self.root.tree_count()
    }

    /// The root hash identifying this map.
    pub fn hash_of(&self) -> Hash {
        self.root_hash
    }

    pub fn key_desc(&self) -> &TupleDescriptor {
        &self.key_desc
    }

    pub fn val_desc(&self) -> &TupleDescriptor {
        &self.val_desc
    }

    /// Both tuple schemas: `(key descriptor, value descriptor)`.
    pub fn descriptors(&self) -> (&TupleDescriptor, &TupleDescriptor) {
        (&self.key_desc, &self.val_desc)
    }

    pub(crate) fn root_node(&self) -> &Node {
        &self.root
    }

    pub(crate) fn store_arc(&self) -> Arc<dyn NodeStore> {
        Arc::clone(&self.store)
    }

    pub(crate) fn store_ref(&self) -> &dyn NodeStore {
        self.store.as_ref()
    }

    /// Look up `key` and pass the pair (or `None`) to `cb`.
    pub async fn get<T>(
        &self,
        key: &Tuple,
        cancel: &Cancellation,
        cb: impl FnOnce(Option<(&[u8], &[u8])>) -> T,
    ) -> Result<T> {
        cancel.check().map_err(Error::Core)?;
        let cursor = Cursor::seek(
            self.store.as_ref(),
            &self.key_desc,
            self.root.clone(),
            key.as_bytes(),
            cancel,
        )
        .await?;
        let hit = cursor.compare_key(key.as_bytes()) == Some(Ordering::Equal);
        if hit {
            match (cursor.current_key(), cursor.current_value()) {
                (Some(k), Some(v)) => Ok(cb(Some((k, v)))),
                _ => Err(Error::invariant("valid cursor lost its pair")),
            }
        } else {
            Ok(cb(None))
        }
    }

    /// True if `key` is present.
    pub async fn has(&self, key: &Tuple, cancel: &Cancellation) -> Result<bool> {
        self.get(key, cancel, |pair| pair.is_some()).await
    }

    /// Iterate the whole map in ascending key order.
    pub async fn iter_all(&self, cancel: &Cancellation) -> Result<MapIter<'_>> {
        self.iter_range(Range::all(), cancel).await
    }

    /// Iterate a bounded range in either direction.
    pub async fn iter_range(&self, range: Range, cancel: &Cancellation) -> Result<MapIter<'_>> {
        let cursor = self.position_cursor(&range, cancel).await?;
        Ok(MapIter {
            key_desc: &self.key_desc,
            cursor,
            range,
            cancel: cancel.clone(),
            done: false,
        })
    }

    /// Begin staging mutations against this map.
    pub fn mutate(self) -> MutableMap {
        MutableMap::new(self)
    }

    /// Structural differ from `self` to `other`.
    pub async fn differ<'a>(
        &'a self,
        other: &'a Map,
        cancel: &Cancellation,
    ) -> Result<TreeDiffer<'a>> {
        if self.key_desc != other.key_desc {
            return Err(Error::invariant("diffed maps have different key schemas"));
        }
        TreeDiffer::from_maps(self, other, cancel).await
    }

    /// Stream the differences from `self` to `other` into `cb`, in key
    /// order. Shared subtrees are pruned without reading them.
    pub async fn diff(
        &self,
        other: &Map,
        cancel: &Cancellation,
        mut cb: impl FnMut(Diff) -> Result<()>,
    ) -> Result<()> {
        let mut differ = self.differ(other, cancel).await?;
        while let Some(diff) = differ.next().await? {
            cancel.check().map_err(Error::Core)?;
            cb(diff)?;
        }
        Ok(())
    }

    async fn position_cursor(&self, range: &Range, cancel: &Cancellation) -> Result<Cursor<'_>> {
        let store = self.store.as_ref();
        let kd = &self.key_desc;
        let root = self.root.clone();
        if !range.reverse {
            match &range.start {
                Cut::Unbound => Cursor::at_start(store, kd, root, cancel).await,
                Cut::Inclusive(k) => Cursor::seek(store, kd, root, k.as_bytes(), cancel).await,
                Cut::Exclusive(k) => {
                    let mut cur = Cursor::seek(store, kd, root, k.as_bytes(), cancel).await?;
                    if cur.compare_key(k.as_bytes()) == Some(Ordering::Equal) {
                        cur.advance().await?;
                    }
                    Ok(cur)
                }
            }
        } else {
            match &range.start {
                Cut::Unbound => Cursor::at_end(store, kd, root, cancel).await,
                Cut::Inclusive(k) => {
                    let mut cur = Cursor::seek(store, kd, root, k.as_bytes(), cancel).await?;
                    if cur.compare_key(k.as_bytes()) != Some(Ordering::Equal) {
                        // landed past the bound (or past-end): step back
                        cur.retreat().await?;
                    }
                    Ok(cur)
                }
                Cut::Exclusive(k) => {
                    let mut cur = Cursor::seek(store, kd, root, k.as_bytes(), cancel).await?;
                    // seek lands at the first key >= bound; the origin is
                    // the last key strictly before it
                    cur.retreat().await?;
                    Ok(cur)
                }
            }
        }
    }
}

/// Streaming iterator over a [`Map`] range.
#[derive(Debug)]
pub struct MapIter<'a> {
    key_desc: &'a TupleDescriptor,
    cursor: Cursor<'a>,
    range: Range,
    cancel: Cancellation,
    done: bool,
}

impl MapIter<'_> {
    /// The next pair, or `None` once the range is exhausted.
    pub async fn next(&mut self) -> Result<Option<(Tuple, Tuple)>> {
        self.cancel.check().map_err(Error::Core)?;
        if self.done || !self.cursor.valid() {
            self.done = true;
            return Ok(None);
        }
        let Some((k, v)) = self.cursor.current_pair() else {
            self.done = true;
            return Ok(None);
        };
        if !self.range.within_stop(self.key_desc, &k) {
            self.done = true;
            return Ok(None);
        }
        if self.range.reverse {
            self.cursor.retreat().await?;
        } else {
            self.cursor.advance().await?;
        }
        Ok(Some((Tuple::from_bytes(k), Tuple::from_bytes(v))))
    }
}
