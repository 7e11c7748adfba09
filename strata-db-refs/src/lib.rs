//! # Strata DB Refs
//!
//! The storage-root record: a small, canonically-serialized mapping from
//! reference names (e.g. `refs/heads/main`) to map root hashes. This is
//! the single mutable pointer a repository overwrites on commit; everything
//! it references is immutable, content-addressed tree data.
//!
//! All fixed-width numeric fields are little-endian.
//!
//! Layout:
//! ```text
//! [Magic 4B][version u8][entry count u32]
//! [entries: name len u16, name bytes, hash 20B] x count   (sorted by name)
//! ```
//!
//! Serialization is canonical: entries are kept name-sorted at all times,
//! so a given mapping has exactly one byte representation.

use std::fmt;
use strata_db_core::{Hash, HASH_LEN};
use thiserror::Error;

/// Magic bytes identifying a serialized ref map.
pub const MAGIC: [u8; 4] = *b"SRM1";

/// Current format version.
pub const VERSION: u8 = 1;

/// Fixed header size: magic + version + entry count.
const HEADER_LEN: usize = 9;

/// Cap on a reference name's encoded length (u16 length prefix).
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Result type alias using our error
pub type Result<T> = std::result::Result<T, RefMapError>;

/// Ref map decode/encode errors
#[derive(Error, Debug)]
pub enum RefMapError {
    #[error("ref map too small: {got} bytes (min {min})")]
    TooSmall { got: usize, min: usize },

    #[error("bad ref map magic")]
    InvalidMagic,

    #[error("unsupported ref map version {0}")]
    UnsupportedVersion(u8),

    #[error("ref map truncated reading entry {0}")]
    Truncated(usize),

    #[error("ref name is not valid UTF-8")]
    InvalidName,

    #[error("ref names out of order or duplicated at entry {0}")]
    NameOrder(usize),

    #[error("ref name exceeds {MAX_NAME_LEN} bytes")]
    NameTooLong,

    #[error("trailing bytes after ref map")]
    TrailingBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RefEntry {
    name: String,
    hash: Hash,
}

/// Mapping from reference name to root hash, the repository storage root.
///
/// Each name appears at most once; lookups of absent names return the zero
/// hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefMap {
    /// Sorted by name at all times.
    entries: Vec<RefEntry>,
}

impl RefMap {
    pub fn new() -> RefMap {
        RefMap::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point `name` at `hash`, overwriting any existing entry in place.
    pub fn set(&mut self, name: &str, hash: Hash) {
        match self.entries.binary_search_by(|e| e.name.as_str().cmp(name)) {
            Ok(i) => self.entries[i].hash = hash,
            Err(i) => self.entries.insert(
                i,
                RefEntry {
                    name: name.to_string(),
                    hash,
                },
            ),
        }
    }

    /// Remove `name`. Removing an absent name is a no-op.
    pub fn delete(&mut self, name: &str) {
        if let Ok(i) = self.entries.binary_search_by(|e| e.name.as_str().cmp(name)) {
            self.entries.remove(i);
        }
    }

    /// The hash `name` points at, or the zero hash if absent.
    pub fn lookup(&self, name: &str) -> Hash {
        match self.entries.binary_search_by(|e| e.name.as_str().cmp(name)) {
            Ok(i) => self.entries[i].hash,
            Err(_) => Hash::NULL,
        }
    }

    /// Iterate `(name, hash)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Hash)> {
        self.entries.iter().map(|e| (e.name.as_str(), e.hash))
    }

    /// Canonical byte serialization.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload: usize = self
            .entries
            .iter()
            .map(|e| 2 + e.name.len() + HASH_LEN)
            .sum();
        let mut buf = Vec::with_capacity(HEADER_LEN + payload);
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            if e.name.len() > MAX_NAME_LEN {
                return Err(RefMapError::NameTooLong);
            }
            buf.extend_from_slice(&(e.name.len() as u16).to_le_bytes());
            buf.extend_from_slice(e.name.as_bytes());
            buf.extend_from_slice(e.hash.as_bytes());
        }
        Ok(buf)
    }

    /// Parse a serialized ref map, validating framing and name order.
    pub fn parse(data: &[u8]) -> Result<RefMap> {
        if data.len() < HEADER_LEN {
            return Err(RefMapError::TooSmall {
                got: data.len(),
                min: HEADER_LEN,
            });
        }
        if data[0..4] != MAGIC {
            return Err(RefMapError::InvalidMagic);
        }
        if data[4] != VERSION {
            return Err(RefMapError::UnsupportedVersion(data[4]));
        }
        let count = u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;

        let mut entries: Vec<RefEntry> = Vec::with_capacity(count.min(1024));
        let mut pos = HEADER_LEN;
        for i in 0..count {
            let Some(len_bytes) = data.get(pos..pos + 2) else {
                return Err(RefMapError::Truncated(i));
            };
            let name_len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
            pos += 2;
            let Some(name_bytes) = data.get(pos..pos + name_len) else {
                return Err(RefMapError::Truncated(i));
            };
            let name = std::str::from_utf8(name_bytes)
                .map_err(|_| RefMapError::InvalidName)?
                .to_string();
            pos += name_len;
            let Some(hash_bytes) = data.get(pos..pos + HASH_LEN) else {
                return Err(RefMapError::Truncated(i));
            };
            let hash = Hash::from_slice(hash_bytes).map_err(|_| RefMapError::Truncated(i))?;
            pos += HASH_LEN;

            if let Some(prev) = entries.last() {
                if prev.name >= name {
                    return Err(RefMapError::NameOrder(i));
                }
            }
            entries.push(RefEntry { name, hash });
        }
        if pos != data.len() {
            return Err(RefMapError::TrailingBytes);
        }
        Ok(RefMap { entries })
    }
}

impl fmt::Display for RefMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, hash) in self.iter() {
            writeln!(f, "{hash} {name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(seed: &str) -> Hash {
        Hash::of(seed.as_bytes())
    }

    #[test]
    fn test_set_lookup_delete() {
        let mut rm = RefMap::new();
        rm.set("refs/heads/main", h("main"));
        rm.set("refs/heads/branch", h("branch"));

        assert_eq!(rm.lookup("refs/heads/main"), h("main"));
        assert_eq!(rm.lookup("nonexistent"), Hash::NULL);

        rm.delete("refs/heads/main");
        assert_eq!(rm.lookup("refs/heads/main"), Hash::NULL);
        assert_eq!(rm.lookup("refs/heads/branch"), h("branch"));

        // deleting an absent name is a no-op
        rm.delete("refs/heads/main");
        assert_eq!(rm.len(), 1);
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut rm = RefMap::new();
        rm.set("refs/heads/main", h("one"));
        rm.set("refs/heads/main", h("two"));
        assert_eq!(rm.len(), 1);
        assert_eq!(rm.lookup("refs/heads/main"), h("two"));
    }

    #[test]
    fn test_round_trip() {
        let mut rm = RefMap::new();
        rm.set("refs/heads/main", h("main"));
        rm.set("refs/heads/branch", h("branch"));
        rm.set("refs/tags/v1", h("v1"));

        let bytes = rm.serialize().unwrap();
        let parsed = RefMap::parse(&bytes).unwrap();
        assert_eq!(parsed, rm);
        assert_eq!(parsed.lookup("refs/heads/branch"), h("branch"));
        assert_eq!(parsed.lookup("missing"), Hash::NULL);

        // canonical: reserializing yields identical bytes
        assert_eq!(parsed.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_entries_iterate_sorted() {
        let mut rm = RefMap::new();
        rm.set("zeta", h("z"));
        rm.set("alpha", h("a"));
        rm.set("mid", h("m"));
        let names: Vec<_> = rm.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            RefMap::parse(&[]),
            Err(RefMapError::TooSmall { .. })
        ));

        let mut rm = RefMap::new();
        rm.set("a", h("a"));
        let good = rm.serialize().unwrap();

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            RefMap::parse(&bad_magic),
            Err(RefMapError::InvalidMagic)
        ));

        let mut bad_version = good.clone();
        bad_version[4] = 99;
        assert!(matches!(
            RefMap::parse(&bad_version),
            Err(RefMapError::UnsupportedVersion(99))
        ));

        assert!(matches!(
            RefMap::parse(&good[..good.len() - 1]),
            Err(RefMapError::Truncated(0))
        ));

        let mut trailing = good;
        trailing.push(0);
        assert!(matches!(
            RefMap::parse(&trailing),
            Err(RefMapError::TrailingBytes)
        ));
    }

    #[test]
    fn test_parse_rejects_unsorted_names() {
        let mut rm = RefMap::new();
        rm.set("a", h("a"));
        rm.set("b", h("b"));
        let mut bytes = rm.serialize().unwrap();
        // swap the two single-byte names to break the order
        let a_pos = HEADER_LEN + 2;
        let b_pos = a_pos + 1 + HASH_LEN + 2;
        bytes.swap(a_pos, b_pos);
        assert!(matches!(
            RefMap::parse(&bytes),
            Err(RefMapError::NameOrder(1))
        ));
    }
}
