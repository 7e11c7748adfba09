//! Fixed-schema binary tuple codec.
//!
//! A tuple is a contiguous byte buffer holding typed, nullable field
//! payloads in descriptor order, followed by a u16 end-offset table for the
//! variable-width fields and a null bitmap. All interpretation goes through
//! a [`TupleDescriptor`]; tuples themselves are opaque bytes and compare by
//! byte equality.
//!
//! Layout:
//! ```text
//! [field payloads][var end offsets: u16 LE x var_count][null bitmap]
//! ```
//!
//! Absent (null) fields contribute zero payload bytes. A null
//! variable-width field repeats the previous end offset so the table stays
//! monotone. The bitmap carries one bit per *nullable* field, LSB-first,
//! set = present; non-nullable fields have no bit.

mod builder;
mod compare;
mod descriptor;
#[allow(clippy::module_inception)]
mod tuple;

pub use builder::{FieldValue, TupleBuilder};
pub use descriptor::{Collation, Encoding, FieldType, TupleDescriptor};
pub use tuple::{Tuple, MAX_TUPLE_SIZE};

use crate::error::Result;
use crate::pool::BufferPool;

/// Build a tuple from a slice of tagged values in one call.
///
/// Convenience over [`TupleBuilder`] for callers that already hold a row of
/// dynamic values. `FieldValue::Null` leaves the field absent; construction
/// fails if a non-nullable field is null or the size cap is exceeded.
pub fn new_tuple(
    desc: &TupleDescriptor,
    pool: &BufferPool,
    values: &[FieldValue<'_>],
) -> Result<Tuple> {
    let mut bld = TupleBuilder::new(desc.clone());
    for (i, v) in values.iter().enumerate() {
        bld.put_value(i, v)?;
    }
    bld.build(pool)
}
