//! Typed tuple construction.
//!
//! The builder stages per-field payloads in a scratch buffer and assembles
//! the final tuple in one pooled allocation. No partially-initialized tuple
//! can escape: `build` fails unless every non-nullable field was populated.

use super::descriptor::{Encoding, TupleDescriptor};
use super::tuple::{Tuple, MAX_TUPLE_SIZE};
use crate::error::{Error, Result};
use crate::pool::BufferPool;

/// Canonical quiet-NaN bit patterns, so equal logical tuples are
/// byte-identical.
const CANONICAL_NAN_32: u32 = 0x7fc0_0000;
const CANONICAL_NAN_64: u64 = 0x7ff8_0000_0000_0000;

/// A tagged runtime value for the dynamic construction path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Null,
    Bool(bool),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(&'a str),
    Bytes(&'a [u8]),
}

/// Builds tuples for one descriptor, reusing its scratch space.
#[derive(Debug)]
pub struct TupleBuilder {
    desc: TupleDescriptor,
    scratch: Vec<u8>,
    /// Per-field (start, len) into `scratch`; `None` = not yet written.
    fields: Vec<Option<(usize, usize)>>,
}

impl TupleBuilder {
    pub fn new(desc: TupleDescriptor) -> Self {
        let n = desc.field_count();
        Self {
            desc,
            scratch: Vec::new(),
            fields: vec![None; n],
        }
    }

    pub fn descriptor(&self) -> &TupleDescriptor {
        &self.desc
    }

    fn stage(&mut self, i: usize, bytes: &[u8]) {
        let start = self.scratch.len();
        self.scratch.extend_from_slice(bytes);
        self.fields[i] = Some((start, bytes.len()));
    }

    pub fn put_bool(&mut self, i: usize, v: bool) {
        self.desc.expect_encoding(i, Encoding::Int8);
        self.stage(i, &[v as u8]);
    }

    pub fn put_int8(&mut self, i: usize, v: i8) {
        self.desc.expect_encoding(i, Encoding::Int8);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_uint8(&mut self, i: usize, v: u8) {
        self.desc.expect_encoding(i, Encoding::Uint8);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_int16(&mut self, i: usize, v: i16) {
        self.desc.expect_encoding(i, Encoding::Int16);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_uint16(&mut self, i: usize, v: u16) {
        self.desc.expect_encoding(i, Encoding::Uint16);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_int32(&mut self, i: usize, v: i32) {
        self.desc.expect_encoding(i, Encoding::Int32);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_uint32(&mut self, i: usize, v: u32) {
        self.desc.expect_encoding(i, Encoding::Uint32);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_int64(&mut self, i: usize, v: i64) {
        self.desc.expect_encoding(i, Encoding::Int64);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_uint64(&mut self, i: usize, v: u64) {
        self.desc.expect_encoding(i, Encoding::Uint64);
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_float32(&mut self, i: usize, v: f32) {
        self.desc.expect_encoding(i, Encoding::Float32);
        let v = if v.is_nan() {
            f32::from_bits(CANONICAL_NAN_32)
        } else {
            v
        };
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_float64(&mut self, i: usize, v: f64) {
        self.desc.expect_encoding(i, Encoding::Float64);
        let v = if v.is_nan() {
            f64::from_bits(CANONICAL_NAN_64)
        } else {
            v
        };
        self.stage(i, &v.to_le_bytes());
    }

    pub fn put_string(&mut self, i: usize, v: &str) {
        self.desc.expect_encoding(i, Encoding::String);
        self.stage(i, v.as_bytes());
    }

    pub fn put_bytes(&mut self, i: usize, v: &[u8]) {
        self.desc.expect_encoding(i, Encoding::Bytes);
        self.stage(i, v);
    }

    /// Write a tagged runtime value to field `i`.
    ///
    /// Fails on a tag/encoding mismatch instead of asserting, since values
    /// on this path typically come from outside the schema's control.
    pub fn put_value(&mut self, i: usize, v: &FieldValue<'_>) -> Result<()> {
        let enc = self.desc.field_type(i).encoding;
        match (v, enc) {
            (FieldValue::Null, _) => {}
            (FieldValue::Bool(b), Encoding::Int8) => self.put_bool(i, *b),
            (FieldValue::Int8(x), Encoding::Int8) => self.put_int8(i, *x),
            (FieldValue::Uint8(x), Encoding::Uint8) => self.put_uint8(i, *x),
            (FieldValue::Int16(x), Encoding::Int16) => self.put_int16(i, *x),
            (FieldValue::Uint16(x), Encoding::Uint16) => self.put_uint16(i, *x),
            (FieldValue::Int32(x), Encoding::Int32) => self.put_int32(i, *x),
            (FieldValue::Uint32(x), Encoding::Uint32) => self.put_uint32(i, *x),
            (FieldValue::Int64(x), Encoding::Int64) => self.put_int64(i, *x),
            (FieldValue::Uint64(x), Encoding::Uint64) => self.put_uint64(i, *x),
            (FieldValue::Float32(x), Encoding::Float32) => self.put_float32(i, *x),
            (FieldValue::Float64(x), Encoding::Float64) => self.put_float64(i, *x),
            (FieldValue::String(s), Encoding::String) => self.put_string(i, s),
            (FieldValue::Bytes(b), Encoding::Bytes) => self.put_bytes(i, b),
            (v, enc) => {
                return Err(Error::invariant(format!(
                    "field {i}: value {v:?} does not match encoding {enc:?}"
                )))
            }
        }
        Ok(())
    }

    /// Assemble the staged fields into a tuple and reset the builder.
    ///
    /// Fails if a non-nullable field is absent or the encoded size would
    /// exceed [`MAX_TUPLE_SIZE`]. The builder is reset in both cases.
    pub fn build(&mut self, pool: &BufferPool) -> Result<Tuple> {
        let result = self.assemble(pool);
        self.scratch.clear();
        self.fields.iter_mut().for_each(|f| *f = None);
        result
    }

    fn assemble(&self, pool: &BufferPool) -> Result<Tuple> {
        let mut payload = 0usize;
        for i in 0..self.desc.field_count() {
            match self.fields[i] {
                Some((_, len)) => payload += len,
                None => {
                    if !self.desc.field_type(i).nullable {
                        return Err(Error::invariant(format!(
                            "cannot build tuple: non-nullable field {i} is absent"
                        )));
                    }
                }
            }
        }

        let total = payload + self.desc.tail_len();
        if total > MAX_TUPLE_SIZE {
            return Err(Error::invariant(format!(
                "tuple size {total} exceeds cap {MAX_TUPLE_SIZE}"
            )));
        }

        let mut buf = pool.alloc(total);
        let mut pos = 0usize;
        let table_start = payload;
        let bitmap_start = payload + self.desc.var_field_count() * 2;

        for i in 0..self.desc.field_count() {
            if let Some((start, len)) = self.fields[i] {
                buf[pos..pos + len].copy_from_slice(&self.scratch[start..start + len]);
                pos += len;
                if let Some(bit) = self.desc.bitmap_bit(i) {
                    buf[bitmap_start + (bit as usize) / 8] |= 1 << (bit % 8);
                }
            }
            if let Some(slot) = self.desc.var_table_index(i) {
                let at = table_start + (slot as usize) * 2;
                buf[at..at + 2].copy_from_slice(&(pos as u16).to_le_bytes());
            }
        }

        Ok(Tuple::from_bytes(buf.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::descriptor::FieldType;

    fn pool() -> BufferPool {
        BufferPool::new()
    }

    #[test]
    fn test_round_trip_fixed_fields() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::Int64, false),
            FieldType::new(Encoding::Uint32, false),
            FieldType::new(Encoding::Float64, false),
        ]);
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_int64(0, -42);
        bld.put_uint32(1, 7);
        bld.put_float64(2, 2.5);
        let tup = bld.build(&pool()).unwrap();

        assert_eq!(desc.get_int64(0, &tup), Some(-42));
        assert_eq!(desc.get_uint32(1, &tup), Some(7));
        assert_eq!(desc.get_float64(2, &tup), Some(2.5));
    }

    #[test]
    fn test_round_trip_variable_and_null() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::String, true),
            FieldType::new(Encoding::Int64, true),
            FieldType::new(Encoding::Bytes, true),
        ]);
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_string(0, "alpha");
        bld.put_bytes(2, &[1, 2, 3]);
        let tup = bld.build(&pool()).unwrap();

        assert_eq!(desc.get_string(0, &tup), Some("alpha"));
        assert_eq!(desc.get_int64(1, &tup), None);
        assert_eq!(desc.get_bytes(2, &tup), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_null_distinct_from_empty_string() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::String, true),
            FieldType::new(Encoding::String, true),
        ]);
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_string(0, "");
        let tup = bld.build(&pool()).unwrap();

        assert_eq!(desc.get_string(0, &tup), Some(""));
        assert_eq!(desc.get_string(1, &tup), None);
        assert!(desc.is_present(0, tup.as_bytes()));
        assert!(!desc.is_present(1, tup.as_bytes()));
    }

    #[test]
    fn test_missing_non_nullable_fails() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::Int64, false),
            FieldType::new(Encoding::Int64, true),
        ]);
        let mut bld = TupleBuilder::new(desc);
        bld.put_int64(1, 1);
        assert!(bld.build(&pool()).is_err());
    }

    #[test]
    fn test_size_cap_enforced() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::Bytes, false),
            FieldType::new(Encoding::Bytes, false),
        ]);
        let mut bld = TupleBuilder::new(desc);
        let big = vec![0u8; 40_000];
        bld.put_bytes(0, &big);
        bld.put_bytes(1, &big);
        assert!(bld.build(&pool()).is_err());
    }

    #[test]
    fn test_builder_resets_after_build() {
        let desc = TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, false)]);
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_int64(0, 1);
        bld.build(&pool()).unwrap();
        // second build must fail: field 0 was reset to absent
        assert!(bld.build(&pool()).is_err());
    }

    #[test]
    fn test_nan_canonicalized() {
        let desc = TupleDescriptor::new(vec![FieldType::new(Encoding::Float64, false)]);
        let mut bld = TupleBuilder::new(desc.clone());
        bld.put_float64(0, f64::NAN);
        let a = bld.build(&pool()).unwrap();
        bld.put_float64(0, -f64::NAN);
        let b = bld.build(&pool()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tagged_value_construction() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::Int64, false),
            FieldType::new(Encoding::String, true),
        ]);
        let tup = crate::tuple::new_tuple(
            &desc,
            &pool(),
            &[FieldValue::Int64(9), FieldValue::Null],
        )
        .unwrap();
        assert_eq!(desc.get_int64(0, &tup), Some(9));
        assert_eq!(desc.get_string(1, &tup), None);

        let err = crate::tuple::new_tuple(
            &desc,
            &pool(),
            &[FieldValue::String("wrong"), FieldValue::Null],
        );
        assert!(err.is_err());
    }
}
