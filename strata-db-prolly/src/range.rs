//! Key ranges for bounded iteration.

use std::cmp::Ordering;
use strata_db_core::{Tuple, TupleDescriptor};

/// One end of a range.
#[derive(Debug, Clone, Default)]
pub enum Cut {
    #[default]
    Unbound,
    Inclusive(Tuple),
    Exclusive(Tuple),
}

/// A key range with a direction.
///
/// `start` is the iteration origin and `stop` the termination bound, so in
/// a reverse range `start` is the upper end.
#[derive(Debug, Clone, Default)]
pub struct Range {
    pub start: Cut,
    pub stop: Cut,
    pub reverse: bool,
}

impl Range {
    /// The full map, in ascending key order.
    pub fn all() -> Range {
        Range::default()
    }

    /// The full map, in descending key order.
    pub fn all_reverse() -> Range {
        Range {
            reverse: true,
            ..Range::default()
        }
    }

    /// True if `key` is on the live side of the stop bound.
    pub(crate) fn within_stop(&self, kd: &TupleDescriptor, key: &[u8]) -> bool {
        match &self.stop {
            Cut::Unbound => true,
            Cut::Inclusive(b) => {
                let ord = kd.compare_bytes(key, b.as_bytes());
                if self.reverse {
                    ord != Ordering::Less
                } else {
                    ord != Ordering::Greater
                }
            }
            Cut::Exclusive(b) => {
                let ord = kd.compare_bytes(key, b.as_bytes());
                if self.reverse {
                    ord == Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_db_core::{BufferPool, Encoding, FieldType, TupleBuilder};

    fn tup(v: u64) -> Tuple {
        let desc = desc();
        let mut bld = TupleBuilder::new(desc);
        bld.put_uint64(0, v);
        bld.build(&BufferPool::new()).unwrap()
    }

    fn desc() -> TupleDescriptor {
        TupleDescriptor::new(vec![FieldType::new(Encoding::Uint64, false)])
    }

    #[test]
    fn test_stop_bounds_forward() {
        let kd = desc();
        let rng = Range {
            start: Cut::Unbound,
            stop: Cut::Inclusive(tup(5)),
            reverse: false,
        };
        assert!(rng.within_stop(&kd, tup(5).as_bytes()));
        assert!(!rng.within_stop(&kd, tup(6).as_bytes()));

        let rng = Range {
            stop: Cut::Exclusive(tup(5)),
            ..Range::all()
        };
        assert!(rng.within_stop(&kd, tup(4).as_bytes()));
        assert!(!rng.within_stop(&kd, tup(5).as_bytes()));
    }

    #[test]
    fn test_stop_bounds_reverse() {
        let kd = desc();
        let rng = Range {
            start: Cut::Unbound,
            stop: Cut::Inclusive(tup(5)),
            reverse: true,
        };
        assert!(rng.within_stop(&kd, tup(5).as_bytes()));
        assert!(!rng.within_stop(&kd, tup(4).as_bytes()));
    }
}
