//! The tuple value type and field access.

use super::descriptor::{Encoding, TupleDescriptor};
use bytes::Bytes;
use std::fmt;

/// Hard cap on the encoded size of a single tuple (u16 offsets).
pub const MAX_TUPLE_SIZE: usize = u16::MAX as usize;

/// An immutable, pooled byte buffer holding one encoded tuple.
///
/// Cloning is cheap (reference-counted bytes). Equality and ordering of the
/// raw type are plain byte comparisons; the logical, schema-aware order
/// lives on [`TupleDescriptor::compare`].
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Tuple {
    data: Bytes,
}

impl Tuple {
    pub fn from_bytes(data: Bytes) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for Tuple {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tuple({} bytes)", self.data.len())
    }
}

impl TupleDescriptor {
    /// True if field `i` is present (non-null) in `data`.
    pub fn is_present(&self, i: usize, data: &[u8]) -> bool {
        match self.bitmap_bit(i) {
            None => true,
            Some(bit) => {
                let bitmap_start = data.len().saturating_sub(self.bitmap_len());
                let byte = bitmap_start + (bit as usize) / 8;
                match data.get(byte) {
                    Some(b) => b & (1 << (bit % 8)) != 0,
                    None => false,
                }
            }
        }
    }

    /// End offset of variable field slot `slot` within the payload region.
    fn var_end(&self, slot: u16, data: &[u8]) -> usize {
        let table_start = data
            .len()
            .saturating_sub(self.bitmap_len() + self.var_field_count() * 2);
        let at = table_start + (slot as usize) * 2;
        match data.get(at..at + 2) {
            Some(b) => u16::from_le_bytes([b[0], b[1]]) as usize,
            None => 0,
        }
    }

    /// Byte range of field `i` within the payload region, or `None` if null.
    ///
    /// Bounded by the field count: the walk is pure arithmetic over the
    /// descriptor and the offset table, never a payload scan.
    fn field_range(&self, i: usize, data: &[u8]) -> Option<(usize, usize)> {
        if !self.is_present(i, data) {
            return None;
        }
        let mut pos = 0usize;
        for j in 0..i {
            match self.field_type(j).encoding.fixed_width() {
                Some(w) => {
                    if self.is_present(j, data) {
                        pos += w;
                    }
                }
                None => {
                    // null variable fields repeat the previous end offset,
                    // so the jump is valid whether or not j is present
                    pos = self.var_end(self.var_table_index(j).unwrap_or(0), data);
                }
            }
        }
        let end = match self.field_type(i).encoding.fixed_width() {
            Some(w) => pos + w,
            None => self.var_end(self.var_table_index(i).unwrap_or(0), data),
        };
        Some((pos, end))
    }

    /// Raw bytes of field `i`, or `None` if the field is null.
    pub fn get_field<'a>(&self, i: usize, tup: &'a Tuple) -> Option<&'a [u8]> {
        let (start, end) = self.field_range(i, tup.as_bytes())?;
        tup.as_bytes().get(start..end)
    }

    pub(crate) fn field_in<'a>(&self, i: usize, data: &'a [u8]) -> Option<&'a [u8]> {
        let (start, end) = self.field_range(i, data)?;
        data.get(start..end)
    }

    pub fn get_bool(&self, i: usize, tup: &Tuple) -> Option<bool> {
        self.expect_encoding(i, Encoding::Int8);
        Some(self.get_field(i, tup)?[0] != 0)
    }

    pub fn get_int8(&self, i: usize, tup: &Tuple) -> Option<i8> {
        self.expect_encoding(i, Encoding::Int8);
        Some(i8::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_uint8(&self, i: usize, tup: &Tuple) -> Option<u8> {
        self.expect_encoding(i, Encoding::Uint8);
        Some(self.get_field(i, tup)?[0])
    }

    pub fn get_int16(&self, i: usize, tup: &Tuple) -> Option<i16> {
        self.expect_encoding(i, Encoding::Int16);
        Some(i16::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_uint16(&self, i: usize, tup: &Tuple) -> Option<u16> {
        self.expect_encoding(i, Encoding::Uint16);
        Some(u16::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_int32(&self, i: usize, tup: &Tuple) -> Option<i32> {
        self.expect_encoding(i, Encoding::Int32);
        Some(i32::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_uint32(&self, i: usize, tup: &Tuple) -> Option<u32> {
        self.expect_encoding(i, Encoding::Uint32);
        Some(u32::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_int64(&self, i: usize, tup: &Tuple) -> Option<i64> {
        self.expect_encoding(i, Encoding::Int64);
        Some(i64::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_uint64(&self, i: usize, tup: &Tuple) -> Option<u64> {
        self.expect_encoding(i, Encoding::Uint64);
        Some(u64::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_float32(&self, i: usize, tup: &Tuple) -> Option<f32> {
        self.expect_encoding(i, Encoding::Float32);
        Some(f32::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_float64(&self, i: usize, tup: &Tuple) -> Option<f64> {
        self.expect_encoding(i, Encoding::Float64);
        Some(f64::from_le_bytes(self.get_field(i, tup)?.try_into().ok()?))
    }

    pub fn get_string<'a>(&self, i: usize, tup: &'a Tuple) -> Option<&'a str> {
        self.expect_encoding(i, Encoding::String);
        std::str::from_utf8(self.get_field(i, tup)?).ok()
    }

    pub fn get_bytes<'a>(&self, i: usize, tup: &'a Tuple) -> Option<&'a [u8]> {
        self.expect_encoding(i, Encoding::Bytes);
        self.get_field(i, tup)
    }
}
