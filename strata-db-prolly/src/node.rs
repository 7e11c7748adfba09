//! On-disk layout of a prolly-tree node.
//!
//! All fixed-width numeric fields are little-endian.
//!
//! Layout:
//! ```text
//! [Magic 4B][level u8][pair count u16][item end offsets: u16 x item_count]
//! [item payloads][cumulative subtree count: LEB128]
//! ```
//!
//! Items alternate key and value. At level 0 the values are value tuples;
//! above level 0 they are meta-values encoding `(subtree count, child hash)`.
//! Serialization is canonical: identical logical nodes produce identical
//! bytes, hence identical hashes. This is the property the structural
//! differ depends on.

use crate::error::{Error, Result};
use bytes::Bytes;
use strata_db_core::{Hash, HASH_LEN};

/// Magic bytes identifying a serialized prolly node.
pub const NODE_MAGIC: [u8; 4] = *b"SPN1";

/// Fixed header size: magic + level + pair count.
const HEADER_LEN: usize = 7;

/// Hard cap on a node's total item payload (u16 offsets).
pub const MAX_NODE_PAYLOAD: usize = u16::MAX as usize;

/// Hard cap on pairs per node.
pub const MAX_NODE_PAIRS: usize = 4096;

/// A decoded tree node: a level, an ordered item sequence, and the
/// cumulative count of key-value pairs in its subtree.
///
/// Nodes are immutable once hashed; cloning shares the underlying buffers.
#[derive(Debug, Clone)]
pub struct Node {
    level: u8,
    /// Alternating key/value item buffers, `2 * pair_count` entries.
    items: Vec<Bytes>,
    tree_count: u64,
}

impl Node {
    /// Assemble a node from its parts, computing the cumulative count.
    ///
    /// `items` must alternate key and value; above level 0 the values must
    /// be meta-values.
    pub fn new(level: u8, items: Vec<Bytes>) -> Result<Node> {
        if items.len() % 2 != 0 {
            return Err(Error::invariant("node items must be key-value pairs"));
        }
        let tree_count = if level == 0 {
            (items.len() / 2) as u64
        } else {
            let mut sum = 0u64;
            for v in items.iter().skip(1).step_by(2) {
                sum += MetaValue::decode(v)?.count;
            }
            sum
        };
        Ok(Node {
            level,
            items,
            tree_count,
        })
    }

    /// The canonical empty leaf.
    pub fn empty_leaf() -> Node {
        Node {
            level: 0,
            items: Vec::new(),
            tree_count: 0,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    pub fn pair_count(&self) -> usize {
        self.items.len() / 2
    }

    /// Total key-value pairs in the subtree rooted here.
    pub fn tree_count(&self) -> u64 {
        self.tree_count
    }

    pub fn key(&self, i: usize) -> &[u8] {
        &self.items[2 * i]
    }

    pub fn value(&self, i: usize) -> &[u8] {
        &self.items[2 * i + 1]
    }

    pub fn key_bytes(&self, i: usize) -> Bytes {
        self.items[2 * i].clone()
    }

    pub fn value_bytes(&self, i: usize) -> Bytes {
        self.items[2 * i + 1].clone()
    }

    /// Largest key in this node's subtree (its last key).
    pub fn last_key(&self) -> Option<&[u8]> {
        self.pair_count().checked_sub(1).map(|i| self.key(i))
    }

    /// Decode the meta-value at pair `i`. Only valid above level 0.
    pub fn meta_value(&self, i: usize) -> Result<MetaValue> {
        debug_assert!(!self.is_leaf());
        MetaValue::decode(self.value(i))
    }

    /// Serialize to canonical bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let pairs = self.pair_count();
        if pairs > MAX_NODE_PAIRS {
            return Err(Error::invariant(format!(
                "node has {pairs} pairs (max {MAX_NODE_PAIRS})"
            )));
        }
        let payload: usize = self.items.iter().map(|i| i.len()).sum();
        if payload > MAX_NODE_PAYLOAD {
            return Err(Error::invariant(format!(
                "node payload {payload} exceeds cap {MAX_NODE_PAYLOAD}"
            )));
        }

        let mut buf = Vec::with_capacity(HEADER_LEN + self.items.len() * 2 + payload + 10);
        buf.extend_from_slice(&NODE_MAGIC);
        buf.push(self.level);
        buf.extend_from_slice(&(pairs as u16).to_le_bytes());

        let mut end = 0u16;
        for item in &self.items {
            end += item.len() as u16;
            buf.extend_from_slice(&end.to_le_bytes());
        }
        for item in &self.items {
            buf.extend_from_slice(item);
        }
        encode_varint(self.tree_count, &mut buf);
        Ok(Bytes::from(buf))
    }

    /// Decode a node from stored bytes, validating the framing.
    pub fn decode(data: Bytes) -> Result<Node> {
        if data.len() < HEADER_LEN {
            return Err(Error::corrupt(format!(
                "node too small: {} bytes (min {HEADER_LEN})",
                data.len()
            )));
        }
        if data[0..4] != NODE_MAGIC {
            return Err(Error::corrupt("bad node magic"));
        }
        let level = data[4];
        let pairs = u16::from_le_bytes([data[5], data[6]]) as usize;
        let item_count = pairs * 2;

        let table_end = HEADER_LEN + item_count * 2;
        if data.len() < table_end {
            return Err(Error::corrupt("node offset table truncated"));
        }

        let mut items = Vec::with_capacity(item_count);
        let payload_start = table_end;
        let mut prev = 0usize;
        for i in 0..item_count {
            let at = HEADER_LEN + i * 2;
            let end = u16::from_le_bytes([data[at], data[at + 1]]) as usize;
            if end < prev || payload_start + end > data.len() {
                return Err(Error::corrupt("node item offsets out of order"));
            }
            items.push(data.slice(payload_start + prev..payload_start + end));
            prev = end;
        }

        let mut pos = payload_start + prev;
        let tree_count = decode_varint(&data, &mut pos)?;
        if pos != data.len() {
            return Err(Error::corrupt("trailing bytes after node"));
        }

        let node = Node {
            level,
            items,
            tree_count,
        };
        // cross-check the stored count against the items
        let expect = Node::new(level, node.items.clone())?.tree_count;
        if expect != tree_count {
            return Err(Error::corrupt(format!(
                "node count mismatch: stored {tree_count}, computed {expect}"
            )));
        }
        Ok(node)
    }
}

// ============================================================================
// Meta values
// ============================================================================

/// Width of the subtree count in a meta-value (u48).
const META_COUNT_LEN: usize = 6;

/// Encoded size of a meta-value.
pub const META_VALUE_LEN: usize = META_COUNT_LEN + HASH_LEN;

/// An internal-node value: the subtree pair count and the child's hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaValue {
    pub count: u64,
    pub child: Hash,
}

impl MetaValue {
    pub fn new(count: u64, child: Hash) -> MetaValue {
        MetaValue { count, child }
    }

    /// Serialize to the fixed 26-byte layout: u48 LE count, 20-byte hash.
    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(META_VALUE_LEN);
        buf.extend_from_slice(&self.count.to_le_bytes()[..META_COUNT_LEN]);
        buf.extend_from_slice(self.child.as_bytes());
        Bytes::from(buf)
    }

    pub fn decode(data: &[u8]) -> Result<MetaValue> {
        if data.len() != META_VALUE_LEN {
            return Err(Error::corrupt(format!(
                "meta value must be {META_VALUE_LEN} bytes, got {}",
                data.len()
            )));
        }
        let mut cnt = [0u8; 8];
        cnt[..META_COUNT_LEN].copy_from_slice(&data[..META_COUNT_LEN]);
        let child = Hash::from_slice(&data[META_COUNT_LEN..]).map_err(Error::Core)?;
        Ok(MetaValue {
            count: u64::from_le_bytes(cnt),
            child,
        })
    }
}

// ============================================================================
// LEB128
// ============================================================================

fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let Some(&byte) = buf.get(*pos) else {
            return Err(Error::corrupt("varint: unexpected end of buffer"));
        };
        *pos += 1;
        let payload = (byte & 0x7f) as u64;
        if shift >= 63 && payload > 1 {
            return Err(Error::corrupt("varint overflow"));
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}
