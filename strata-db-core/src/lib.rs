//! # Strata DB Core
//!
//! Core types for the Strata DB storage engine.
//!
//! This crate provides:
//! - 20-byte content hashes ([`Hash`]) and the arena [`BufferPool`]
//! - The fixed-schema binary tuple codec ([`tuple`])
//! - The content-addressed [`NodeStore`] trait with memory and file backends
//! - Cooperative [`Cancellation`] shared across pipeline tasks
//!
//! ## Design Principles
//!
//! 1. **Async at the I/O seam only**: node-store reads and writes suspend;
//!    everything above them is synchronous in-memory work
//! 2. **Content addressing everywhere**: object identity is a deterministic
//!    function of bytes, so writes are idempotent and retries are free
//! 3. **No implicit globals**: the pool and stores are injected dependencies

pub mod cancel;
pub mod error;
pub mod hash;
pub mod pool;
pub mod store;
pub mod tuple;

pub use cancel::Cancellation;
pub use error::{Error, Result};
pub use hash::{Hash, HASH_LEN};
pub use pool::BufferPool;
pub use store::{FileNodeStore, MemoryNodeStore, NodeStore};
pub use tuple::{
    new_tuple, Collation, Encoding, FieldType, FieldValue, Tuple, TupleBuilder, TupleDescriptor,
    MAX_TUPLE_SIZE,
};
