//! Folding a mutation stream into a persistent map.
//!
//! The materializer walks the base tree and an ascending mutation stream
//! concurrently, emitting the winning pair at each key into a fresh
//! chunker. The base map is unaffected; the result is a new root.

use crate::chunker::TreeChunker;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::map::Map;
use async_trait::async_trait;
use std::cmp::Ordering;
use strata_db_core::{Cancellation, Tuple};
use tracing::debug;

/// An ascending stream of staged mutations.
///
/// Yields `(key, Some(value))` for inserts/updates and `(key, None)` for
/// deletes. Keys must be strictly ascending; each key appears once.
#[async_trait]
pub(crate) trait MutationIter: Send {
    async fn next_mutation(&mut self) -> Result<Option<(Tuple, Option<Tuple>)>>;
}

/// Merge-walk `base` and `mutations` into a new map.
///
/// - mutation key absent from base: insert (tombstones are ignored)
/// - mutation key present in base: the staged value wins; a tombstone
///   drops the pair
/// - all other base pairs pass through unchanged
pub(crate) async fn materialize_mutations<M: MutationIter>(
    base: &Map,
    mut mutations: M,
    cancel: &Cancellation,
) -> Result<Map> {
    let store = base.store_arc();
    let key_desc = base.key_desc().clone();
    let mut chunker = TreeChunker::new(store.as_ref(), key_desc.clone(), cancel);
    let mut cursor = Cursor::at_start(
        store.as_ref(),
        base.key_desc(),
        base.root_node().clone(),
        cancel,
    )
    .await?;

    let mut emitted = 0u64;
    let mut mutation = mutations.next_mutation().await?;
    loop {
        cancel.check().map_err(Error::Core)?;
        match (&mutation, cursor.valid()) {
            (None, false) => break,
            (None, true) => {
                let Some((k, v)) = cursor.current_pair() else {
                    return Err(Error::invariant("valid cursor lost its pair"));
                };
                chunker.append(k, v).await?;
                emitted += 1;
                cursor.advance().await?;
            }
            (Some((key, value)), false) => {
                if let Some(v) = value {
                    chunker.append(key.to_bytes(), v.to_bytes()).await?;
                    emitted += 1;
                }
                mutation = mutations.next_mutation().await?;
            }
            (Some((key, value)), true) => {
                let Some(ord) = cursor.compare_key(key.as_bytes()) else {
                    return Err(Error::invariant("valid cursor lost its key"));
                };
                match ord {
                    Ordering::Less => {
                        let Some((k, v)) = cursor.current_pair() else {
                            return Err(Error::invariant("valid cursor lost its pair"));
                        };
                        chunker.append(k, v).await?;
                        emitted += 1;
                        cursor.advance().await?;
                    }
                    Ordering::Greater => {
                        if let Some(v) = value {
                            chunker.append(key.to_bytes(), v.to_bytes()).await?;
                            emitted += 1;
                        }
                        mutation = mutations.next_mutation().await?;
                    }
                    Ordering::Equal => {
                        if let Some(v) = value {
                            chunker.append(key.to_bytes(), v.to_bytes()).await?;
                            emitted += 1;
                        }
                        cursor.advance().await?;
                        mutation = mutations.next_mutation().await?;
                    }
                }
            }
        }
    }

    let (root, root_hash) = chunker.done().await?;
    debug!(count = emitted, %root_hash, "materialized map");
    Ok(Map::from_parts(
        root,
        root_hash,
        key_desc,
        base.val_desc().clone(),
        store,
    ))
}
