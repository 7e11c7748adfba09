//! 20-byte content hash used to address tree nodes.
//!
//! Hashes are produced by SHA-256 over a node's serialized bytes, truncated
//! to the 20-byte address width. The all-zero hash denotes "absent" and is
//! never produced by hashing real content.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of a content hash in bytes.
pub const HASH_LEN: usize = 20;

/// A 20-byte content address, lexicographically comparable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// The zero hash, denoting an absent reference.
    pub const NULL: Hash = Hash([0u8; HASH_LEN]);

    /// Digest `bytes` into a content hash (SHA-256 truncated to 20 bytes).
    pub fn of(bytes: &[u8]) -> Hash {
        let digest = Sha256::digest(bytes);
        let mut h = [0u8; HASH_LEN];
        h.copy_from_slice(&digest[..HASH_LEN]);
        Hash(h)
    }

    /// Wrap an existing 20-byte value.
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Hash {
        Hash(bytes)
    }

    /// Read a hash from a byte slice, which must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Hash> {
        if bytes.len() != HASH_LEN {
            return Err(Error::decode(format!(
                "hash must be {} bytes, got {}",
                HASH_LEN,
                bytes.len()
            )));
        }
        let mut h = [0u8; HASH_LEN];
        h.copy_from_slice(bytes);
        Ok(Hash(h))
    }

    /// Parse a hash from its 40-character lowercase hex form.
    pub fn from_hex(s: &str) -> Result<Hash> {
        let bytes = hex::decode(s).map_err(|e| Error::decode(format!("bad hash hex: {e}")))?;
        Hash::from_slice(&bytes)
    }

    /// True if this is the zero hash.
    pub fn is_null(&self) -> bool {
        *self == Hash::NULL
    }

    /// The raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form: enough hex to identify a node in logs
        write!(f, "Hash({}..)", &self.to_hex()[..8])
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
