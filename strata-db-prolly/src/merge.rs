//! Streaming three-way merge.
//!
//! `left` and `right` are both diffed against `base`; rather than applying
//! both diff sets to `base`, patches from `right` are applied directly to
//! `left`, which halves the write work. The diff walker and the
//! materializer run as two tasks joined by a bounded patch channel.
//! Backpressure is the only flow control, and the channel preserves the
//! walker's key order, which is exactly the chunker's precondition.

use crate::diff::{same_outcome, Diff};
use crate::error::{Error, Result};
use crate::map::Map;
use crate::materialize::{materialize_mutations, MutationIter};
use async_trait::async_trait;
use std::cmp::Ordering;
use strata_db_core::Cancellation;
use strata_db_core::Tuple;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the patch channel between walker and materializer.
pub const PATCH_BUFFER_SIZE: usize = 1024;

/// A concurrent edit the resolver declined to resolve.
///
/// The merged map keeps `left`'s value for the conflicted key.
#[derive(Debug, Clone)]
pub struct MergeConflict {
    pub key: Tuple,
    pub left: Diff,
    pub right: Diff,
}

/// Outcome of a three-way merge: the best-effort merged map plus any
/// unresolved conflicts. Callers decide whether conflicts are fatal.
#[derive(Debug)]
pub struct MergeResult {
    pub map: Map,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeResult {
    /// Treat any unresolved conflict as an error.
    pub fn into_map(self) -> Result<Map> {
        if self.conflicts.is_empty() {
            Ok(self.map)
        } else {
            Err(Error::Conflicted(self.conflicts.len()))
        }
    }
}

/// Merge `left` and `right` relative to their common ancestor `base`.
///
/// When a key was modified on both sides with different outcomes the
/// resolver is consulted; returning `None` records a conflict and leaves
/// the key at `left`'s value. Cancelling `cancel` stops both tasks and
/// publishes no root; any nodes already written are unreferenced and left
/// to store garbage collection.
pub async fn three_way_merge<F>(
    base: &Map,
    left: &Map,
    right: &Map,
    resolver: F,
    cancel: &Cancellation,
) -> Result<MergeResult>
where
    F: FnMut(&Diff, &Diff) -> Option<Diff> + Send + 'static,
{
    for side in [left, right] {
        if base.descriptors() != side.descriptors() {
            return Err(Error::invariant(
                "three-way merge requires matching tuple schemas",
            ));
        }
    }

    let (tx, rx) = mpsc::channel(PATCH_BUFFER_SIZE);
    let walker = {
        let base = base.clone();
        let left = left.clone();
        let right = right.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { send_patches(&base, &left, &right, resolver, tx, cancel).await })
    };

    let patches = PatchBuffer {
        rx,
        cancel: cancel.clone(),
    };
    let merged = materialize_mutations(left, patches, cancel).await;
    let walked = walker
        .await
        .map_err(|e| Error::invariant(format!("merge walker aborted: {e}")))?;

    // a failed materializer drops the receiver, which the walker observes
    // as a closed channel; the materializer's error is the root cause
    let map = merged?;
    let conflicts = walked?;
    debug!(
        conflicts = conflicts.len(),
        root = %map.hash_of(),
        "three-way merge complete"
    );
    Ok(MergeResult { map, conflicts })
}

/// Transforms the two diff streams into a single patch stream against
/// `left`, collecting unresolved conflicts.
async fn send_patches<F>(
    base: &Map,
    left: &Map,
    right: &Map,
    mut resolver: F,
    tx: mpsc::Sender<(Tuple, Option<Tuple>)>,
    cancel: Cancellation,
) -> Result<Vec<MergeConflict>>
where
    F: FnMut(&Diff, &Diff) -> Option<Diff> + Send,
{
    let key_desc = base.key_desc();
    let mut left_diffs = base.differ(left, &cancel).await?;
    let mut right_diffs = base.differ(right, &cancel).await?;
    let mut conflicts = Vec::new();

    let mut l = left_diffs.next().await?;
    let mut r = right_diffs.next().await?;
    while let (Some(lv), Some(rv)) = (&l, &r) {
        cancel.check().map_err(Error::Core)?;
        match key_desc.compare(&lv.key, &rv.key) {
            Ordering::Less => {
                // already in left
                l = left_diffs.next().await?;
            }
            Ordering::Greater => {
                send(&tx, rv).await?;
                r = right_diffs.next().await?;
            }
            Ordering::Equal => {
                if !same_outcome(lv, rv) {
                    match resolver(lv, rv) {
                        Some(resolved) => send(&tx, &resolved).await?,
                        None => conflicts.push(MergeConflict {
                            key: lv.key.clone(),
                            left: lv.clone(),
                            right: rv.clone(),
                        }),
                    }
                }
                l = left_diffs.next().await?;
                r = right_diffs.next().await?;
            }
        }
    }

    // left's remainder needs no patches: those changes are already in left
    while let Some(rv) = &r {
        cancel.check().map_err(Error::Core)?;
        send(&tx, rv).await?;
        r = right_diffs.next().await?;
    }

    Ok(conflicts)
}

async fn send(tx: &mpsc::Sender<(Tuple, Option<Tuple>)>, diff: &Diff) -> Result<()> {
    tx.send((diff.key.clone(), diff.to.clone()))
        .await
        .map_err(|_| Error::Core(strata_db_core::Error::Cancelled))
}

/// Receiving half of the patch channel, driving the materializer.
struct PatchBuffer {
    rx: mpsc::Receiver<(Tuple, Option<Tuple>)>,
    cancel: Cancellation,
}

#[async_trait]
impl MutationIter for PatchBuffer {
    async fn next_mutation(&mut self) -> Result<Option<(Tuple, Option<Tuple>)>> {
        self.cancel.check().map_err(Error::Core)?;
        Ok(self.rx.recv().await)
    }
}
