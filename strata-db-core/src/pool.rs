//! Arena buffer pool for tuple and node allocation.
//!
//! Tuples are small and allocated in bursts (builders, meta pairs, clones
//! during chunking). The pool carves them out of larger shared chunks so a
//! burst of tuple builds costs one allocation, not hundreds.
//!
//! The pool is an injected dependency and is safe to share across tasks.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::sync::Arc;

/// Size of the backing chunks the pool carves allocations from.
const CHUNK_SIZE: usize = 64 * 1024;

/// A thread-safe arena allocator handing out zeroed `BytesMut` buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferPool {
    inner: Arc<Mutex<PoolInner>>,
}

#[derive(Debug, Default)]
struct PoolInner {
    chunk: BytesMut,
}

impl BufferPool {
    /// Create a new empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed buffer of exactly `len` bytes.
    ///
    /// The buffer is carved from the current chunk when it fits; requests
    /// larger than the chunk size get a dedicated allocation.
    pub fn alloc(&self, len: usize) -> BytesMut {
        let mut inner = self.inner.lock();
        debug_assert!(inner.chunk.is_empty());
        if inner.chunk.capacity() < len {
            inner.chunk = BytesMut::with_capacity(CHUNK_SIZE.max(len));
        }
        inner.chunk.resize(len, 0);
        inner.chunk.split_to(len)
    }

    /// Copy `bytes` into a pooled buffer.
    pub fn copy(&self, bytes: &[u8]) -> BytesMut {
        let mut buf = self.alloc(bytes.len());
        buf.copy_from_slice(bytes);
        buf
    }
}
