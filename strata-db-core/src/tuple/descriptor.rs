//! Tuple descriptors: the immutable schema a tuple is interpreted under.

use std::sync::Arc;

/// Physical encoding of a single tuple field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    /// Variable-length UTF-8 string.
    String,
    /// Variable-length raw bytes.
    Bytes,
}

impl Encoding {
    /// Payload width for fixed-width encodings, `None` for variable-width.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Encoding::Int8 | Encoding::Uint8 => Some(1),
            Encoding::Int16 | Encoding::Uint16 => Some(2),
            Encoding::Int32 | Encoding::Uint32 | Encoding::Float32 => Some(4),
            Encoding::Int64 | Encoding::Uint64 | Encoding::Float64 => Some(8),
            Encoding::String | Encoding::Bytes => None,
        }
    }

    /// True for string/bytes fields that use the end-offset table.
    pub const fn is_variable(self) -> bool {
        self.fixed_width().is_none()
    }
}

/// Comparison transform for string and bytes fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    /// Unsigned byte order, no transform.
    #[default]
    Binary,
    /// ASCII case-insensitive byte order.
    CaseInsensitive,
}

/// One field of a tuple schema: encoding, nullability, and collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    pub encoding: Encoding,
    pub nullable: bool,
    pub collation: Collation,
}

impl FieldType {
    pub fn new(encoding: Encoding, nullable: bool) -> Self {
        Self {
            encoding,
            nullable,
            collation: Collation::Binary,
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }
}

/// An ordered, immutable list of field types.
///
/// All tuples of a given map share one key descriptor and one value
/// descriptor. Descriptors are cheap to clone and compare.
#[derive(Debug, Clone)]
pub struct TupleDescriptor {
    inner: Arc<DescInner>,
}

#[derive(Debug)]
struct DescInner {
    fields: Vec<FieldType>,
    /// Per-field index into the var end-offset table, for variable fields.
    var_index: Vec<Option<u16>>,
    /// Per-field index into the null bitmap, for nullable fields.
    null_index: Vec<Option<u16>>,
    var_count: usize,
    nullable_count: usize,
}

impl PartialEq for TupleDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.fields == other.inner.fields
    }
}

impl Eq for TupleDescriptor {}

impl TupleDescriptor {
    pub fn new(fields: Vec<FieldType>) -> Self {
        let mut var_index = Vec::with_capacity(fields.len());
        let mut null_index = Vec::with_capacity(fields.len());
        let mut var_count = 0usize;
        let mut nullable_count = 0usize;
        for f in &fields {
            if f.encoding.is_variable() {
                var_index.push(Some(var_count as u16));
                var_count += 1;
            } else {
                var_index.push(None);
            }
            if f.nullable {
                null_index.push(Some(nullable_count as u16));
                nullable_count += 1;
            } else {
                null_index.push(None);
            }
        }
        Self {
            inner: Arc::new(DescInner {
                fields,
                var_index,
                null_index,
                var_count,
                nullable_count,
            }),
        }
    }

    pub fn field_count(&self) -> usize {
        self.inner.fields.len()
    }

    pub fn field_type(&self, i: usize) -> &FieldType {
        &self.inner.fields[i]
    }

    /// Number of variable-width fields (size of the end-offset table).
    pub fn var_field_count(&self) -> usize {
        self.inner.var_count
    }

    /// Number of nullable fields (bits in the null bitmap).
    pub fn nullable_field_count(&self) -> usize {
        self.inner.nullable_count
    }

    /// Size of the null bitmap in bytes.
    pub(crate) fn bitmap_len(&self) -> usize {
        (self.inner.nullable_count + 7) / 8
    }

    /// Size of the trailing metadata (offset table + bitmap).
    pub(crate) fn tail_len(&self) -> usize {
        self.inner.var_count * 2 + self.bitmap_len()
    }

    pub(crate) fn var_table_index(&self, i: usize) -> Option<u16> {
        self.inner.var_index[i]
    }

    pub(crate) fn bitmap_bit(&self, i: usize) -> Option<u16> {
        self.inner.null_index[i]
    }

    pub(crate) fn expect_encoding(&self, i: usize, enc: Encoding) {
        assert_eq!(
            self.inner.fields[i].encoding, enc,
            "field {} written with mismatched encoding",
            i
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_indexes() {
        let desc = TupleDescriptor::new(vec![
            FieldType::new(Encoding::Int64, false),
            FieldType::new(Encoding::String, true),
            FieldType::new(Encoding::Int32, true),
            FieldType::new(Encoding::Bytes, false),
        ]);
        assert_eq!(desc.field_count(), 4);
        assert_eq!(desc.var_field_count(), 2);
        assert_eq!(desc.nullable_field_count(), 2);
        assert_eq!(desc.bitmap_len(), 1);
        assert_eq!(desc.tail_len(), 5);
        assert_eq!(desc.var_table_index(1), Some(0));
        assert_eq!(desc.var_table_index(3), Some(1));
        assert_eq!(desc.bitmap_bit(0), None);
        assert_eq!(desc.bitmap_bit(2), Some(1));
    }

    #[test]
    fn test_descriptor_equality_ignores_arc_identity() {
        let a = TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, false)]);
        let b = TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, false)]);
        let c = TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, true)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
