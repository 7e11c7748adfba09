//! Schema-aware total order over tuples.
//!
//! Comparison is field-wise lexicographic under the descriptor: null sorts
//! before any value, NaN sorts after every other float, strings and bytes
//! compare by unsigned byte order after the field's collation transform.

use super::descriptor::{Collation, Encoding, TupleDescriptor};
use super::tuple::Tuple;
use std::cmp::Ordering;

impl TupleDescriptor {
    /// Total order over two tuples encoded under this descriptor.
    pub fn compare(&self, a: &Tuple, b: &Tuple) -> Ordering {
        self.compare_bytes(a.as_bytes(), b.as_bytes())
    }

    /// Same as [`compare`](Self::compare), over raw encoded tuples.
    pub fn compare_bytes(&self, a: &[u8], b: &[u8]) -> Ordering {
        for i in 0..self.field_count() {
            let fa = self.field_in(i, a);
            let fb = self.field_in(i, b);
            let ord = match (fa, fb) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => {
                    let ft = self.field_type(i);
                    compare_field(ft.encoding, ft.collation, x, y)
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn compare_field(enc: Encoding, coll: Collation, a: &[u8], b: &[u8]) -> Ordering {
    match enc {
        Encoding::Int8 => decode_cmp(a, b, i8::from_le_bytes),
        Encoding::Uint8 => decode_cmp(a, b, u8::from_le_bytes),
        Encoding::Int16 => decode_cmp(a, b, i16::from_le_bytes),
        Encoding::Uint16 => decode_cmp(a, b, u16::from_le_bytes),
        Encoding::Int32 => decode_cmp(a, b, i32::from_le_bytes),
        Encoding::Uint32 => decode_cmp(a, b, u32::from_le_bytes),
        Encoding::Int64 => decode_cmp(a, b, i64::from_le_bytes),
        Encoding::Uint64 => decode_cmp(a, b, u64::from_le_bytes),
        Encoding::Float32 => float_cmp(a, b, f32::from_le_bytes, |v| v.is_nan(), f32::total_cmp),
        Encoding::Float64 => float_cmp(a, b, f64::from_le_bytes, |v| v.is_nan(), f64::total_cmp),
        Encoding::String | Encoding::Bytes => match coll {
            Collation::Binary => a.cmp(b),
            Collation::CaseInsensitive => case_insensitive_cmp(a, b),
        },
    }
}

fn decode_cmp<T: Ord, const N: usize>(a: &[u8], b: &[u8], decode: fn([u8; N]) -> T) -> Ordering {
    match (try_array::<N>(a), try_array::<N>(b)) {
        (Some(x), Some(y)) => decode(x).cmp(&decode(y)),
        // malformed width: fall back to raw bytes so the order stays total
        _ => a.cmp(b),
    }
}

fn float_cmp<T: Copy, const N: usize>(
    a: &[u8],
    b: &[u8],
    decode: fn([u8; N]) -> T,
    is_nan: fn(T) -> bool,
    total: fn(&T, &T) -> Ordering,
) -> Ordering {
    match (try_array::<N>(a), try_array::<N>(b)) {
        (Some(x), Some(y)) => {
            let (x, y) = (decode(x), decode(y));
            match (is_nan(x), is_nan(y)) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => total(&x, &y),
            }
        }
        _ => a.cmp(b),
    }
}

fn try_array<const N: usize>(b: &[u8]) -> Option<[u8; N]> {
    b.try_into().ok()
}

fn case_insensitive_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let fold = |c: &u8| c.to_ascii_lowercase();
    a.iter().map(fold).cmp(b.iter().map(fold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use crate::tuple::descriptor::FieldType;
    use crate::tuple::TupleBuilder;

    fn int_tuple(desc: &TupleDescriptor, v: i64) -> Tuple {
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_int64(0, v);
        bld.build(&BufferPool::new()).unwrap()
    }

    #[test]
    fn test_signed_order() {
        let desc = TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, false)]);
        let pairs = [(-5i64, 3i64), (i64::MIN, i64::MAX), (-1, 0), (0, 1)];
        for (lo, hi) in pairs {
            let a = int_tuple(&desc, lo);
            let b = int_tuple(&desc, hi);
            assert_eq!(desc.compare(&a, &b), Ordering::Less, "{lo} < {hi}");
            assert_eq!(desc.compare(&b, &a), Ordering::Greater);
            assert_eq!(desc.compare(&a, &a), Ordering::Equal);
        }
    }

    #[test]
    fn test_null_sorts_first() {
        let desc = TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, true)]);
        let pool = BufferPool::new();
        let mut bld = TupleBuilder::new(desc.clone());
        let null = bld.build(&pool).unwrap();
        bld.put_int64(0, i64::MIN);
        let min = bld.build(&pool).unwrap();
        assert_eq!(desc.compare(&null, &min), Ordering::Less);
        assert_eq!(desc.compare(&null, &null), Ordering::Equal);
    }

    #[test]
    fn test_nan_sorts_last() {
        let desc = TupleDescriptor::new(vec![FieldType::new(Encoding::Float64, false)]);
        let pool = BufferPool::new();
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_float64(0, f64::NAN);
        let nan = bld.build(&pool).unwrap();
        bld.put_float64(0, f64::INFINITY);
        let inf = bld.build(&pool).unwrap();
        assert_eq!(desc.compare(&inf, &nan), Ordering::Less);
        assert_eq!(desc.compare(&nan, &nan), Ordering::Equal);
    }

    #[test]
    fn test_multi_field_lexicographic() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::Int64, false),
            FieldType::new(Encoding::String, true),
        ]);
        let pool = BufferPool::new();
        let mut bld = TupleBuilder::new(desc.clone());

        bld.put_int64(0, 1);
        bld.put_string(1, "zzz");
        let a = bld.build(&pool).unwrap();

        bld.put_int64(0, 2);
        bld.put_string(1, "aaa");
        let b = bld.build(&pool).unwrap();

        // first field dominates
        assert_eq!(desc.compare(&a, &b), Ordering::Less);

        bld.put_int64(0, 1);
        bld.put_string(1, "aab");
        let c = bld.build(&pool).unwrap();
        assert_eq!(desc.compare(&c, &a), Ordering::Less);
    }

    #[test]
    fn test_case_insensitive_collation() {
        let desc = TupleDescriptor::new(vec![FieldType::new(Encoding::String, false)
            .with_collation(Collation::CaseInsensitive)]);
        let pool = BufferPool::new();
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_string(0, "Apple");
        let a = bld.build(&pool).unwrap();
        bld.put_string(0, "apple");
        let b = bld.build(&pool).unwrap();
        bld.put_string(0, "banana");
        let c = bld.build(&pool).unwrap();
        assert_eq!(desc.compare(&a, &b), Ordering::Equal);
        assert_eq!(desc.compare(&a, &c), Ordering::Less);
    }
}
