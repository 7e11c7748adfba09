//! A map plus its in-memory overlay of staged edits.

use crate::error::{Error, Result};
use crate::map::{Map, MapIter};
use crate::materialize::materialize_mutations;
use crate::overlay::{Overlay, OverlayIter};
use crate::range::{Cut, Range};
use std::cmp::Ordering;
use strata_db_core::{Cancellation, Tuple, TupleDescriptor};

/// A [`Map`] with pending mutations buffered in an overlay.
///
/// Reads consult the overlay first, then the persistent tree. A mutable
/// map is single-writer: it is created from a map and consumed by
/// [`materialize`](MutableMap::materialize).
#[derive(Debug)]
pub struct MutableMap {
    base: Map,
    overlay: Overlay,
}

impl MutableMap {
    pub(crate) fn new(base: Map) -> MutableMap {
        let overlay = Overlay::new(base.key_desc().clone());
        MutableMap { base, overlay }
    }

    /// The map these mutations will apply to.
    pub fn base(&self) -> &Map {
        &self.base
    }

    /// Number of staged mutations.
    pub fn pending(&self) -> usize {
        self.overlay.len()
    }

    /// Stage an insert or update.
    pub fn put(&mut self, key: Tuple, value: Tuple) -> Result<()> {
        self.overlay.put(key, Some(value))
    }

    /// Stage a delete. Deleting an absent key is a silent no-op at
    /// materialization time.
    pub fn delete(&mut self, key: Tuple) -> Result<()> {
        self.overlay.put(key, None)
    }

    /// Look up `key`, overlay first; a staged delete reads as absent.
    pub async fn get<T>(
        &self,
        key: &Tuple,
        cancel: &Cancellation,
        cb: impl FnOnce(Option<(&[u8], &[u8])>) -> T,
    ) -> Result<T> {
        match self.overlay.get(key) {
            Some(Some(value)) => Ok(cb(Some((key.as_bytes(), value.as_bytes())))),
            Some(None) => Ok(cb(None)),
            None => self.base.get(key, cancel, cb).await,
        }
    }

    /// True if `key` reads as present.
    pub async fn has(&self, key: &Tuple, cancel: &Cancellation) -> Result<bool> {
        self.get(key, cancel, |pair| pair.is_some()).await
    }

    /// Iterate overlay and persistent pairs merged, whole map ascending.
    pub async fn iter_all(&self, cancel: &Cancellation) -> Result<MergedIter<'_>> {
        self.iter_range(Range::all(), cancel).await
    }

    /// Iterate overlay and persistent pairs merged over a range.
    pub async fn iter_range(&self, range: Range, cancel: &Cancellation) -> Result<MergedIter<'_>> {
        let mem = self.position_overlay(&range);
        let tree = self.base.iter_range(range.clone(), cancel).await?;
        Ok(MergedIter {
            key_desc: self.base.key_desc(),
            range,
            mem,
            tree,
            tree_pending: None,
            tree_done: false,
            cancel: cancel.clone(),
        })
    }

    /// Fold the staged mutations into the base, producing a new map.
    ///
    /// The base map is unaffected; this consumes the mutable map.
    pub async fn materialize(self, cancel: &Cancellation) -> Result<Map> {
        materialize_mutations(&self.base, self.overlay.into_mutations(), cancel).await
    }

    fn position_overlay(&self, range: &Range) -> OverlayIter<'_> {
        let kd = self.base.key_desc();
        if !range.reverse {
            match &range.start {
                Cut::Unbound => self.overlay.iter_at_start(),
                Cut::Inclusive(k) => self.overlay.iter_at(k),
                Cut::Exclusive(k) => {
                    let mut it = self.overlay.iter_at(k);
                    if let Some((cur, _)) = it.current() {
                        if kd.compare(cur, k) == Ordering::Equal {
                            it.advance();
                        }
                    }
                    it
                }
            }
        } else {
            match &range.start {
                Cut::Unbound => self.overlay.iter_at_end(),
                Cut::Inclusive(k) => self.overlay.iter_at_or_before(k),
                Cut::Exclusive(k) => {
                    let mut it = self.overlay.iter_at_or_before(k);
                    if let Some((cur, _)) = it.current() {
                        if kd.compare(cur, k) == Ordering::Equal {
                            it.retreat();
                        }
                    }
                    it
                }
            }
        }
    }
}

/// Merged iteration over staged and persistent pairs.
///
/// Overlay entries shadow persistent ones at equal keys; tombstones drop
/// the pair entirely.
#[derive(Debug)]
pub struct MergedIter<'a> {
    key_desc: &'a TupleDescriptor,
    range: Range,
    mem: OverlayIter<'a>,
    tree: MapIter<'a>,
    tree_pending: Option<(Tuple, Tuple)>,
    tree_done: bool,
    cancel: Cancellation,
}

impl MergedIter<'_> {
    pub async fn next(&mut self) -> Result<Option<(Tuple, Tuple)>> {
        loop {
            self.cancel.check().map_err(Error::Core)?;
            let mem_cur = self.mem.current().filter(|(k, _)| {
                self.range.within_stop(self.key_desc, k.as_bytes())
            });
            if self.tree_pending.is_none() && !self.tree_done {
                self.tree_pending = self.tree.next().await?;
                self.tree_done = self.tree_pending.is_none();
            }

            match (mem_cur, &self.tree_pending) {
                (None, None) => return Ok(None),
                (None, Some(_)) => {
                    let Some(pair) = self.tree_pending.take() else {
                        return Ok(None);
                    };
                    return Ok(Some(pair));
                }
                (Some((k, v)), None) => {
                    let out = v.map(|v| (k.clone(), v.clone()));
                    self.step_mem();
                    match out {
                        Some(pair) => return Ok(Some(pair)),
                        None => continue, // tombstone over absent key
                    }
                }
                (Some((mk, mv)), Some((tk, _))) => {
                    let ord = self.key_desc.compare(mk, tk);
                    let mem_first = if self.range.reverse {
                        ord == Ordering::Greater
                    } else {
                        ord == Ordering::Less
                    };
                    if ord == Ordering::Equal {
                        // overlay shadows the persistent pair
                        let out = mv.map(|v| (mk.clone(), v.clone()));
                        self.step_mem();
                        self.tree_pending = None;
                        match out {
                            Some(pair) => return Ok(Some(pair)),
                            None => continue, // staged delete
                        }
                    } else if mem_first {
                        let out = mv.map(|v| (mk.clone(), v.clone()));
                        self.step_mem();
                        match out {
                            Some(pair) => return Ok(Some(pair)),
                            None => continue,
                        }
                    } else {
                        let Some(pair) = self.tree_pending.take() else {
                            return Ok(None);
                        };
                        return Ok(Some(pair));
                    }
                }
            }
        }
    }

    fn step_mem(&mut self) {
        if self.range.reverse {
            self.mem.retreat();
        } else {
            self.mem.advance();
        }
    }
}
