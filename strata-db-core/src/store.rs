//! Content-addressed node store traits and built-in backends.
//!
//! The store is the only I/O seam in the map core: everything above it is
//! synchronous in-memory work. Stores may be remote; callers assume latency
//! and propagate cancellation. Writes are idempotent because the address is
//! a deterministic function of the bytes.

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::pool::BufferPool;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A content-addressed blob store for serialized tree nodes.
#[async_trait]
pub trait NodeStore: Debug + Send + Sync {
    /// Read the bytes previously stored under `hash`.
    ///
    /// Returns `Error::NotFound` if the store has no such content, and
    /// `Error::Cancelled` if `cancel` fires before the read completes.
    async fn read(&self, hash: Hash, cancel: &Cancellation) -> Result<Bytes>;

    /// Store `bytes` and return their content hash.
    ///
    /// Identical bytes produce the same hash; stores deduplicate.
    /// Returns `Error::Cancelled` if `cancel` fires before the write
    /// starts; a write already in flight may still land, which is safe
    /// because writes are idempotent and unreferenced nodes are garbage.
    async fn write(&self, bytes: Bytes, cancel: &Cancellation) -> Result<Hash>;

    /// The buffer pool callers should allocate tuples from.
    fn pool(&self) -> &BufferPool;
}

// ============================================================================
// MemoryNodeStore
// ============================================================================

/// An in-memory node store for tests and ephemeral maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    pool: BufferPool,
    blobs: Arc<RwLock<HashMap<Hash, Bytes>>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("RwLock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn read(&self, hash: Hash, cancel: &Cancellation) -> Result<Bytes> {
        cancel.check()?;
        self.blobs
            .read()
            .expect("RwLock poisoned")
            .get(&hash)
            .cloned()
            .ok_or_else(|| Error::not_found(hash.to_hex()))
    }

    async fn write(&self, bytes: Bytes, cancel: &Cancellation) -> Result<Hash> {
        cancel.check()?;
        let hash = Hash::of(&bytes);
        self.blobs
            .write()
            .expect("RwLock poisoned")
            .insert(hash, bytes);
        Ok(hash)
    }

    fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

// ============================================================================
// FileNodeStore
// ============================================================================

/// A file-backed node store laying blobs out as `objects/<hex>`.
///
/// Writes skip the disk entirely when the object already exists, which is
/// what makes repeated materializations of identical subtrees cheap.
#[derive(Debug, Clone)]
pub struct FileNodeStore {
    pool: BufferPool,
    objects_dir: PathBuf,
}

impl FileNodeStore {
    /// Open a store rooted at `base`, creating `base/objects` if needed.
    pub async fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let objects_dir = base.into().join("objects");
        tokio::fs::create_dir_all(&objects_dir)
            .await
            .map_err(|e| Error::transport(format!("create {}: {e}", objects_dir.display())))?;
        Ok(Self {
            pool: BufferPool::new(),
            objects_dir,
        })
    }

    fn object_path(&self, hash: Hash) -> PathBuf {
        self.objects_dir.join(hash.to_hex())
    }
}

#[async_trait]
impl NodeStore for FileNodeStore {
    async fn read(&self, hash: Hash, cancel: &Cancellation) -> Result<Bytes> {
        cancel.check()?;
        let path = self.object_path(hash);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(hash.to_hex()))
            }
            Err(e) => Err(Error::transport(format!("read {}: {e}", path.display()))),
        }
    }

    async fn write(&self, bytes: Bytes, cancel: &Cancellation) -> Result<Hash> {
        cancel.check()?;
        let hash = Hash::of(&bytes);
        let path = self.object_path(hash);
        match tokio::fs::metadata(&path).await {
            Ok(_) => return Ok(hash), // content-addressed: already present
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::transport(format!("stat {}: {e}", path.display()))),
        }
        cancel.check()?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::transport(format!("write {}: {e}", path.display())))?;
        debug!(%hash, bytes = bytes.len(), "stored node object");
        Ok(hash)
    }

    fn pool(&self) -> &BufferPool {
        &self.pool
    }
}
