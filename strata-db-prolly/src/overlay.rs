//! In-memory overlay of pending edits.
//!
//! A probabilistic skip list keyed by tuple comparison under the map's key
//! descriptor. Values are value tuples or a tombstone (`None`) marking a
//! pending delete. The base level is doubly linked so iteration runs in
//! both directions.
//!
//! Not safe for concurrent mutation; safe for concurrent reads once the
//! writer is done with it.

use crate::error::{Error, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use strata_db_core::{Tuple, TupleDescriptor};

/// Capacity bound on pending mutations.
///
/// Exceeding it surfaces `Error::OverlayFull`; the caller must materialize
/// and restart mutation.
pub const MAX_PENDING: usize = 64 * 1024;

const MAX_HEIGHT: usize = 12;
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct SkipEntry {
    key: Tuple,
    /// `None` is the tombstone.
    value: Option<Tuple>,
    /// Base-level back link.
    prev: usize,
    /// Forward links, one per tower level.
    tower: Vec<usize>,
}

/// Ordered map of pending edits keyed by tuple.
#[derive(Debug)]
pub struct Overlay {
    key_desc: TupleDescriptor,
    entries: Vec<SkipEntry>,
    head: [usize; MAX_HEIGHT],
    tail: usize,
    rng: SmallRng,
}

impl Overlay {
    pub fn new(key_desc: TupleDescriptor) -> Overlay {
        Overlay {
            key_desc,
            entries: Vec::new(),
            head: [NIL; MAX_HEIGHT],
            tail: NIL,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn key_desc(&self) -> &TupleDescriptor {
        &self.key_desc
    }

    /// Number of distinct keys with pending edits.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_of(&self, at: usize, level: usize) -> usize {
        if at == NIL {
            self.head[level]
        } else {
            self.entries[at].tower[level]
        }
    }

    fn set_next(&mut self, at: usize, level: usize, to: usize) {
        if at == NIL {
            self.head[level] = to;
        } else {
            self.entries[at].tower[level] = to;
        }
    }

    /// Walk down the towers, recording the rightmost entry strictly less
    /// than `key` at each level.
    fn search(&self, key: &Tuple) -> [usize; MAX_HEIGHT] {
        let mut update = [NIL; MAX_HEIGHT];
        let mut cur = NIL;
        for level in (0..MAX_HEIGHT).rev() {
            loop {
                let next = self.next_of(cur, level);
                if next != NIL
                    && self
                        .key_desc
                        .compare(&self.entries[next].key, key)
                        .is_lt()
                {
                    cur = next;
                } else {
                    break;
                }
            }
            update[level] = cur;
        }
        update
    }

    /// Stage an edit: `Some(tuple)` inserts or updates, `None` deletes.
    ///
    /// Staging over an existing pending key replaces it in place.
    pub fn put(&mut self, key: Tuple, value: Option<Tuple>) -> Result<()> {
        let update = self.search(&key);
        let found = self.next_of(update[0], 0);
        if found != NIL && self.key_desc.compare(&self.entries[found].key, &key).is_eq() {
            self.entries[found].value = value;
            return Ok(());
        }

        if self.entries.len() >= MAX_PENDING {
            return Err(Error::OverlayFull {
                pending: self.entries.len(),
                max: MAX_PENDING,
            });
        }

        let height = self.random_height();
        let idx = self.entries.len();
        let mut tower = Vec::with_capacity(height);
        for level in 0..height {
            tower.push(self.next_of(update[level], level));
        }

        let succ = self.next_of(update[0], 0);
        self.entries.push(SkipEntry {
            key,
            value,
            prev: update[0],
            tower,
        });
        for level in 0..height {
            self.set_next(update[level], level, idx);
        }
        if succ != NIL {
            self.entries[succ].prev = idx;
        } else {
            self.tail = idx;
        }
        Ok(())
    }

    /// Pending edit for `key`: `None` = no pending edit, `Some(None)` =
    /// pending delete, `Some(Some(v))` = pending insert/update.
    pub fn get(&self, key: &Tuple) -> Option<Option<&Tuple>> {
        let update = self.search(key);
        let found = self.next_of(update[0], 0);
        if found != NIL && self.key_desc.compare(&self.entries[found].key, key).is_eq() {
            Some(self.entries[found].value.as_ref())
        } else {
            None
        }
    }

    /// Iterator positioned on the smallest pending key.
    pub fn iter_at_start(&self) -> OverlayIter<'_> {
        OverlayIter {
            overlay: self,
            cur: self.head[0],
        }
    }

    /// Iterator positioned on the largest pending key.
    pub fn iter_at_end(&self) -> OverlayIter<'_> {
        OverlayIter {
            overlay: self,
            cur: self.tail,
        }
    }

    /// Iterator positioned on the smallest pending key >= `key`.
    pub fn iter_at(&self, key: &Tuple) -> OverlayIter<'_> {
        let update = self.search(key);
        OverlayIter {
            overlay: self,
            cur: self.next_of(update[0], 0),
        }
    }

    /// Largest pending key <= `key`, for reverse iteration origins.
    pub fn iter_at_or_before(&self, key: &Tuple) -> OverlayIter<'_> {
        let update = self.search(key);
        let at_or_after = self.next_of(update[0], 0);
        let cur = if at_or_after != NIL
            && self
                .key_desc
                .compare(&self.entries[at_or_after].key, key)
                .is_eq()
        {
            at_or_after
        } else {
            update[0]
        };
        OverlayIter { overlay: self, cur }
    }

    fn random_height(&mut self) -> usize {
        // geometric with p = 1/2, capped at the tower height
        let bits: u32 = self.rng.gen();
        ((bits.trailing_ones() as usize) + 1).min(MAX_HEIGHT)
    }
}

/// Consuming mutation stream over an overlay, in ascending key order.
#[derive(Debug)]
pub(crate) struct OverlayMutations {
    overlay: Overlay,
    cur: usize,
}

impl Overlay {
    /// Consume the overlay into the stream the materializer folds in.
    pub(crate) fn into_mutations(self) -> OverlayMutations {
        let cur = self.head[0];
        OverlayMutations { overlay: self, cur }
    }
}

#[async_trait::async_trait]
impl crate::materialize::MutationIter for OverlayMutations {
    async fn next_mutation(&mut self) -> Result<Option<(Tuple, Option<Tuple>)>> {
        if self.cur == NIL {
            return Ok(None);
        }
        let e = &self.overlay.entries[self.cur];
        let out = (e.key.clone(), e.value.clone());
        self.cur = e.tower[0];
        Ok(Some(out))
    }
}

/// Bidirectional iterator over pending edits.
///
/// `current` yields the key and the staged value (`None` = tombstone).
#[derive(Debug, Clone)]
pub struct OverlayIter<'a> {
    overlay: &'a Overlay,
    cur: usize,
}

impl<'a> OverlayIter<'a> {
    pub fn current(&self) -> Option<(&'a Tuple, Option<&'a Tuple>)> {
        if self.cur == NIL {
            return None;
        }
        let e = &self.overlay.entries[self.cur];
        Some((&e.key, e.value.as_ref()))
    }

    pub fn advance(&mut self) {
        if self.cur != NIL {
            self.cur = self.overlay.entries[self.cur].tower[0];
        }
    }

    pub fn retreat(&mut self) {
        if self.cur != NIL {
            self.cur = self.overlay.entries[self.cur].prev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use strata_db_core::{BufferPool, Encoding, FieldType, TupleBuilder};

    fn desc() -> TupleDescriptor {
        TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, false)])
    }

    fn tup(v: i64) -> Tuple {
        let mut bld = TupleBuilder::new(desc());
        bld.put_int64(0, v);
        bld.build(&BufferPool::new()).unwrap()
    }

    fn keys(ov: &Overlay) -> Vec<i64> {
        let d = desc();
        let mut out = Vec::new();
        let mut it = ov.iter_at_start();
        while let Some((k, _)) = it.current() {
            out.push(d.get_int64(0, k).unwrap());
            it.advance();
        }
        out
    }

    #[test]
    fn test_sorted_insertion() {
        let mut ov = Overlay::new(desc());
        for v in [5i64, 1, 9, 3, 7, -2] {
            ov.put(tup(v), Some(tup(v * 10))).unwrap();
        }
        assert_eq!(keys(&ov), vec![-2, 1, 3, 5, 7, 9]);
        assert_eq!(ov.len(), 6);
    }

    #[test]
    fn test_put_replaces_in_place() {
        let mut ov = Overlay::new(desc());
        ov.put(tup(1), Some(tup(10))).unwrap();
        ov.put(tup(1), Some(tup(20))).unwrap();
        assert_eq!(ov.len(), 1);
        let v = ov.get(&tup(1)).unwrap().unwrap();
        assert_eq!(desc().get_int64(0, v), Some(20));
    }

    #[test]
    fn test_tombstone() {
        let mut ov = Overlay::new(desc());
        ov.put(tup(1), Some(tup(10))).unwrap();
        ov.put(tup(1), None).unwrap();
        assert_eq!(ov.get(&tup(1)), Some(None));
        assert_eq!(ov.get(&tup(2)), None);
    }

    #[test]
    fn test_reverse_iteration() {
        let mut ov = Overlay::new(desc());
        for v in 0..100i64 {
            ov.put(tup(v), Some(tup(v))).unwrap();
        }
        let d = desc();
        let mut it = ov.iter_at_end();
        let mut expect = 99i64;
        while let Some((k, _)) = it.current() {
            assert_eq!(d.get_int64(0, k), Some(expect));
            expect -= 1;
            it.retreat();
        }
        assert_eq!(expect, -1);
    }

    #[test]
    fn test_seek() {
        let mut ov = Overlay::new(desc());
        for v in [0i64, 2, 4, 6] {
            ov.put(tup(v), Some(tup(v))).unwrap();
        }
        let d = desc();
        let it = ov.iter_at(&tup(3));
        let (k, _) = it.current().unwrap();
        assert_eq!(d.get_int64(0, k), Some(4));

        let it = ov.iter_at(&tup(7));
        assert!(it.current().is_none());

        let it = ov.iter_at_or_before(&tup(3));
        let (k, _) = it.current().unwrap();
        assert_eq!(d.get_int64(0, k), Some(2));

        let it = ov.iter_at_or_before(&tup(4));
        let (k, _) = it.current().unwrap();
        assert_eq!(d.get_int64(0, k), Some(4));
    }

    #[test]
    fn test_capacity_bound() {
        let d = TupleDescriptor::new(vec![FieldType::new(Encoding::Uint64, false)]);
        let pool = BufferPool::new();
        let mut ov = Overlay::new(d.clone());
        let mut bld = TupleBuilder::new(d);
        for v in 0..MAX_PENDING as u64 {
            bld.put_uint64(0, v);
            let k = bld.build(&pool).unwrap();
            ov.put(k, Some(Tuple::from_bytes(Bytes::new()))).unwrap();
        }
        bld.put_uint64(0, u64::MAX);
        let k = bld.build(&pool).unwrap();
        assert!(matches!(
            ov.put(k, None),
            Err(Error::OverlayFull { .. })
        ));
        // replacing an existing key is still allowed at capacity
        bld.put_uint64(0, 0);
        let k = bld.build(&pool).unwrap();
        ov.put(k, None).unwrap();
    }
}
