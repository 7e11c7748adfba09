//! Diff and three-way merge behavior, including subtree pruning.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_db_core::{
    BufferPool, Cancellation, Encoding, FieldType, Hash, MemoryNodeStore, NodeStore, Tuple,
    TupleBuilder, TupleDescriptor,
};
use strata_db_prolly::{three_way_merge, Diff, DiffKind, Map};

/// Store wrapper counting reads, for pruning assertions.
#[derive(Debug)]
struct CountingStore {
    inner: MemoryNodeStore,
    reads: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryNodeStore::new(),
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NodeStore for CountingStore {
    async fn read(&self, hash: Hash, cancel: &Cancellation) -> strata_db_core::Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.read(hash, cancel).await
    }

    async fn write(&self, bytes: Bytes, cancel: &Cancellation) -> strata_db_core::Result<Hash> {
        self.inner.write(bytes, cancel).await
    }

    fn pool(&self) -> &BufferPool {
        self.inner.pool()
    }
}

fn key_desc() -> TupleDescriptor {
    TupleDescriptor::new(vec![FieldType::new(Encoding::String, false)])
}

fn val_desc() -> TupleDescriptor {
    TupleDescriptor::new(vec![FieldType::new(Encoding::Int64, true)])
}

fn skey(pool: &BufferPool, s: &str) -> Tuple {
    let mut bld = TupleBuilder::new(key_desc());
    bld.put_string(0, s);
    bld.build(pool).unwrap()
}

fn ival(pool: &BufferPool, v: i64) -> Tuple {
    let mut bld = TupleBuilder::new(val_desc());
    bld.put_int64(0, v);
    bld.build(pool).unwrap()
}

async fn map_with(store: &Arc<dyn NodeStore>, pairs: &[(&str, i64)]) -> Map {
    let mut m = Map::new_empty(store.clone(), key_desc(), val_desc())
        .await
        .unwrap()
        .mutate();
    for &(k, v) in pairs {
        m.put(skey(store.pool(), k), ival(store.pool(), v)).unwrap();
    }
    m.materialize(&Cancellation::new()).await.unwrap()
}

async fn get_val(map: &Map, store: &Arc<dyn NodeStore>, k: &str) -> Option<i64> {
    let vd = val_desc();
    map.get(&skey(store.pool(), k), &Cancellation::new(), |pair| {
        pair.map(|(_, v)| {
            let v = Tuple::from_bytes(Bytes::copy_from_slice(v));
            vd.get_int64(0, &v).unwrap()
        })
    })
    .await
    .unwrap()
}

fn keep_left() -> impl FnMut(&Diff, &Diff) -> Option<Diff> + Send + 'static {
    |left: &Diff, _right: &Diff| Some(left.clone())
}

#[tokio::test]
async fn test_diff_streams_changes_in_key_order() {
    let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
    let from = map_with(&store, &[("a", 1), ("b", 2), ("c", 3)]).await;
    let to = map_with(&store, &[("b", 2), ("c", 30), ("d", 4)]).await;

    let mut kinds = Vec::new();
    let kd = key_desc();
    from.diff(&to, &Cancellation::new(), |d| {
        let key = kd.get_string(0, &d.key).unwrap().to_string();
        kinds.push((key, d.kind));
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(
        kinds,
        vec![
            ("a".to_string(), DiffKind::Removed),
            ("c".to_string(), DiffKind::Modified),
            ("d".to_string(), DiffKind::Added),
        ]
    );
}

#[tokio::test]
async fn test_diff_of_identical_maps_reads_nothing() {
    let store = Arc::new(CountingStore::new());
    let dyn_store: Arc<dyn NodeStore> = store.clone();
    let pairs: Vec<(String, i64)> = (0..2000).map(|i| (format!("k{i:06}"), i)).collect();
    let pair_refs: Vec<(&str, i64)> = pairs.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let m = map_with(&dyn_store, &pair_refs).await;

    let before = store.reads();
    let mut count = 0usize;
    m.diff(&m.clone(), &Cancellation::new(), |_| {
        count += 1;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(count, 0, "identical maps must produce an empty stream");
    assert_eq!(store.reads(), before, "equal roots must read zero nodes");
}

#[tokio::test]
async fn test_diff_prunes_shared_subtrees() {
    let store = Arc::new(CountingStore::new());
    let dyn_store: Arc<dyn NodeStore> = store.clone();
    let pairs: Vec<(String, i64)> = (0..5000).map(|i| (format!("k{i:06}"), i)).collect();
    let pair_refs: Vec<(&str, i64)> = pairs.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let base = map_with(&dyn_store, &pair_refs).await;

    // change exactly one key near the middle
    let mut m = base.clone().mutate();
    m.put(skey(dyn_store.pool(), "k002500"), ival(dyn_store.pool(), -1))
        .unwrap();
    let changed = m.materialize(&Cancellation::new()).await.unwrap();

    let total_nodes = store.inner.len();
    let before = store.reads();
    let mut diffs = 0usize;
    base.diff(&changed, &Cancellation::new(), |d| {
        assert_eq!(d.kind, DiffKind::Modified);
        diffs += 1;
        Ok(())
    })
    .await
    .unwrap();
    let read = store.reads() - before;

    assert_eq!(diffs, 1);
    assert!(
        read < total_nodes / 2,
        "diff read {read} of {total_nodes} nodes; shared subtrees must be pruned"
    );
}

#[tokio::test]
async fn test_three_way_merge_disjoint_edits() {
    let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
    let base = map_with(&store, &[("a", 1), ("b", 2), ("c", 3)]).await;

    // left: delete a, update b -> 20
    let mut l = base.clone().mutate();
    l.delete(skey(store.pool(), "a")).unwrap();
    l.put(skey(store.pool(), "b"), ival(store.pool(), 20)).unwrap();
    let left = l.materialize(&Cancellation::new()).await.unwrap();

    // right: insert d -> 4, update b -> 20 (same outcome as left)
    let mut r = base.clone().mutate();
    r.put(skey(store.pool(), "d"), ival(store.pool(), 4)).unwrap();
    r.put(skey(store.pool(), "b"), ival(store.pool(), 20)).unwrap();
    let right = r.materialize(&Cancellation::new()).await.unwrap();

    let result = three_way_merge(&base, &left, &right, keep_left(), &Cancellation::new())
        .await
        .unwrap();

    assert!(result.conflicts.is_empty());
    let merged = result.into_map().unwrap();
    assert_eq!(merged.count(), 3);
    assert_eq!(get_val(&merged, &store, "a").await, None);
    assert_eq!(get_val(&merged, &store, "b").await, Some(20));
    assert_eq!(get_val(&merged, &store, "c").await, Some(3));
    assert_eq!(get_val(&merged, &store, "d").await, Some(4));
}

#[tokio::test]
async fn test_three_way_merge_conflict_keeps_left() {
    let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
    let base = map_with(&store, &[("b", 2)]).await;

    let mut l = base.clone().mutate();
    l.put(skey(store.pool(), "b"), ival(store.pool(), 20)).unwrap();
    let left = l.materialize(&Cancellation::new()).await.unwrap();

    let mut r = base.clone().mutate();
    r.put(skey(store.pool(), "b"), ival(store.pool(), 200)).unwrap();
    let right = r.materialize(&Cancellation::new()).await.unwrap();

    let refuse = |_: &Diff, _: &Diff| -> Option<Diff> { None };
    let result = three_way_merge(&base, &left, &right, refuse, &Cancellation::new())
        .await
        .unwrap();

    assert_eq!(result.conflicts.len(), 1);
    let kd = key_desc();
    assert_eq!(kd.get_string(0, &result.conflicts[0].key), Some("b"));
    assert_eq!(get_val(&result.map, &store, "b").await, Some(20));

    // strict callers can refuse a conflicted merge outright
    assert!(matches!(
        result.into_map(),
        Err(strata_db_prolly::Error::Conflicted(1))
    ));
}

#[tokio::test]
async fn test_three_way_merge_right_side_deletes() {
    let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
    let pairs: Vec<(String, i64)> = (0..50).map(|i| (format!("k{i:02}"), i)).collect();
    let pair_refs: Vec<(&str, i64)> = pairs.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let base = map_with(&store, &pair_refs).await;

    let left = base.clone();
    let mut r = base.clone().mutate();
    r.delete(skey(store.pool(), "k25")).unwrap();
    let right = r.materialize(&Cancellation::new()).await.unwrap();

    let merged = three_way_merge(&base, &left, &right, keep_left(), &Cancellation::new())
        .await
        .unwrap()
        .into_map()
        .unwrap();

    assert_eq!(merged.count(), 49);
    assert_eq!(get_val(&merged, &store, "k25").await, None);
    assert_eq!(merged.hash_of(), right.hash_of());
}

#[tokio::test]
async fn test_merge_of_single_leaf_maps_reads_nothing() {
    // every tree here is a single leaf root, already held by its Map, so
    // the whole merge must complete without touching the store for reads
    let store = Arc::new(CountingStore::new());
    let dyn_store: Arc<dyn NodeStore> = store.clone();
    let base = map_with(&dyn_store, &[("a", 1), ("b", 2), ("c", 3)]).await;

    let mut l = base.clone().mutate();
    l.delete(skey(dyn_store.pool(), "a")).unwrap();
    l.put(skey(dyn_store.pool(), "b"), ival(dyn_store.pool(), 20))
        .unwrap();
    let left = l.materialize(&Cancellation::new()).await.unwrap();

    let mut r = base.clone().mutate();
    r.put(skey(dyn_store.pool(), "d"), ival(dyn_store.pool(), 4))
        .unwrap();
    let right = r.materialize(&Cancellation::new()).await.unwrap();

    let before = store.reads();
    let merged = three_way_merge(&base, &left, &right, keep_left(), &Cancellation::new())
        .await
        .unwrap()
        .into_map()
        .unwrap();
    assert_eq!(store.reads(), before, "merge of root-only trees must not read");
    assert_eq!(merged.count(), 3);
    assert_eq!(get_val(&merged, &dyn_store, "b").await, Some(20));
    assert_eq!(get_val(&merged, &dyn_store, "d").await, Some(4));
}

#[tokio::test]
async fn test_merge_observes_cancellation() {
    let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
    let base = map_with(&store, &[("a", 1)]).await;
    let mut l = base.clone().mutate();
    l.put(skey(store.pool(), "b"), ival(store.pool(), 2)).unwrap();
    let left = l.materialize(&Cancellation::new()).await.unwrap();
    let mut r = base.clone().mutate();
    r.put(skey(store.pool(), "c"), ival(store.pool(), 3)).unwrap();
    let right = r.materialize(&Cancellation::new()).await.unwrap();

    let cancel = Cancellation::new();
    cancel.cancel();
    let result = three_way_merge(&base, &left, &right, keep_left(), &cancel).await;
    assert!(matches!(
        result,
        Err(strata_db_prolly::Error::Core(
            strata_db_core::Error::Cancelled
        ))
    ));
}

#[tokio::test]
async fn test_merge_rejects_mismatched_schemas() {
    let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::new());
    let base = map_with(&store, &[("a", 1)]).await;
    let other_kd = TupleDescriptor::new(vec![FieldType::new(Encoding::Uint64, false)]);
    let odd = Map::new_empty(store.clone(), other_kd, val_desc())
        .await
        .unwrap();

    let result = three_way_merge(&base, &odd, &base, keep_left(), &Cancellation::new()).await;
    assert!(result.is_err());
}
