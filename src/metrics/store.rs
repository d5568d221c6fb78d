//! Rotation store: the current bucket plus a fixed-size history ring.
//!
//! Recording loads the current bucket through an `ArcSwap` and then only
//! takes that bucket's own locks. A bucket reference, once loaded, stays
//! valid for the whole call, so an observation racing a rotation lands in
//! exactly one of the two buckets; retired buckets remain lockable.
//!
//! History semantics: `history_at(0)` is the most recently retired bucket and
//! `history_at(depth)` the oldest one retained. Anything further back is
//! absent rather than wrapped.

use crate::core::{MonitorError, Result, MAX_HISTORY_DEPTH};
use crate::metrics::bucket::IntervalBucket;
use crate::metrics::kind::AggregationKind;
use crate::metrics::registry::{MetricId, MetricRegistry, RegistryView};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Circular buffer of retired buckets with `depth + 1` slots
#[derive(Debug)]
struct HistoryRing {
    slots: Vec<Option<Arc<IntervalBucket>>>,
    /// Slot that receives the next retired bucket
    cursor: usize,
}

impl HistoryRing {
    fn new(depth: usize) -> Self {
        Self {
            slots: vec![None; depth.saturating_add(1)],
            cursor: 0,
        }
    }

    fn push(&mut self, bucket: Arc<IntervalBucket>) {
        self.slots[self.cursor] = Some(bucket);
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    fn at(&self, versions_ago: usize) -> Option<Arc<IntervalBucket>> {
        let len = self.slots.len();
        if versions_ago >= len {
            return None;
        }
        let index = (self.cursor + len - 1 - versions_ago) % len;
        self.slots[index].as_ref().map(Arc::clone)
    }
}

/// Owner of the current bucket and the retained history
#[derive(Debug)]
pub struct RotationStore {
    registry: Arc<MetricRegistry>,
    current: ArcSwap<IntervalBucket>,
    history: Mutex<HistoryRing>,
    depth: usize,
}

impl RotationStore {
    /// Store keeping `depth` buckets besides the most recently retired one
    pub fn new(depth: usize) -> Self {
        Self::with_registry(Arc::new(MetricRegistry::new()), depth)
    }

    /// Store over an existing registry; the first bucket is seeded from it.
    ///
    /// Depths above `MAX_HISTORY_DEPTH` are capped; `Config::validate`
    /// rejects them before a monitor gets here.
    pub fn with_registry(registry: Arc<MetricRegistry>, depth: usize) -> Self {
        if depth > MAX_HISTORY_DEPTH {
            tracing::warn!(
                requested = depth,
                max = MAX_HISTORY_DEPTH,
                "history depth capped"
            );
        }
        let depth = depth.min(MAX_HISTORY_DEPTH);
        let first = Self::seed(&registry);
        Self {
            registry,
            current: ArcSwap::from_pointee(first),
            history: Mutex::new(HistoryRing::new(depth)),
            depth,
        }
    }

    fn seed(registry: &MetricRegistry) -> IntervalBucket {
        let table = registry.table();
        IntervalBucket::seeded(table.iter().map(|d| (d.id, d.kind)))
    }

    /// Configured history depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Read-only registry handle for consumers
    pub fn registry_view(&self) -> RegistryView {
        RegistryView::new(Arc::clone(&self.registry))
    }

    /// The bucket currently receiving observations
    pub fn current(&self) -> Arc<IntervalBucket> {
        self.current.load_full()
    }

    /// Get-or-register a persistent metric. A new metric gets its value slot
    /// in the current bucket before its identity becomes resolvable.
    pub fn register(
        &self,
        name: &str,
        kind: AggregationKind,
        description: &str,
        tags: HashMap<String, String>,
    ) -> MetricId {
        self.registry.register_with(name, kind, description, tags, |descriptor| {
            self.current.load().install(descriptor.id, descriptor.kind);
        })
    }

    pub fn observe_adhoc(&self, name: &str, value: f64) {
        self.current.load().add_adhoc(name, value);
    }

    pub fn overwrite_adhoc(&self, name: &str, value: f64) {
        self.current.load().set_adhoc(name, value);
    }

    pub fn observe_persistent(&self, id: MetricId, kind: AggregationKind, value: f64) -> Result<()> {
        self.current.load().add_persistent(id, kind, value)
    }

    pub fn overwrite_persistent(
        &self,
        id: MetricId,
        kind: AggregationKind,
        value: f64,
    ) -> Result<()> {
        self.current.load().set_persistent(id, kind, value)
    }

    /// Swap in a fresh bucket and archive the current one.
    ///
    /// The registry table stays read-locked from seeding through the swap,
    /// so no registration can slip in between and miss the new bucket.
    pub fn rotate(&self) -> Arc<IntervalBucket> {
        let table = self.registry.table();
        let next = Arc::new(IntervalBucket::seeded(table.iter().map(|d| (d.id, d.kind))));

        let mut history = self.history.lock();
        let retired = self.current.swap(next);
        history.push(Arc::clone(&retired));
        let slot = (history.cursor + history.slots.len() - 1) % history.slots.len();
        drop(history);
        drop(table);

        tracing::debug!(
            history_slot = slot,
            entries = retired.size(),
            started_at = %retired.started_at(),
            "rotated bucket"
        );
        retired
    }

    /// Bucket retired `versions_ago` rotations before the latest one
    pub fn history_at(&self, versions_ago: usize) -> Option<Arc<IntervalBucket>> {
        self.history.lock().at(versions_ago)
    }

    /// Like [`history_at`](Self::history_at) but with a descriptive error
    pub fn require_history(&self, versions_ago: usize) -> Result<Arc<IntervalBucket>> {
        self.history_at(versions_ago).ok_or_else(|| {
            MonitorError::NotFound(format!(
                "no bucket {} versions back (history depth {})",
                versions_ago, self.depth
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_rotate_returns_previous_bucket() {
        let store = RotationStore::new(2);
        store.observe_adhoc("x", 1.0);

        let retired = store.rotate();

        assert_eq!(retired.adhoc("x"), Some(1.0));
        assert_eq!(store.current().adhoc("x"), None);
        assert!(Arc::ptr_eq(&retired, &store.history_at(0).unwrap()));
    }

    #[test]
    fn test_new_bucket_mirrors_registry() {
        let store = RotationStore::new(1);
        let calls = store.register("calls", AggregationKind::Count, "", HashMap::new());

        for _ in 0..5 {
            store.observe_persistent(calls, AggregationKind::Count, 1.0).unwrap();
        }
        let retired = store.rotate();

        assert_eq!(retired.persistent(calls).unwrap().count(), 5);
        assert_eq!(store.current().persistent(calls).unwrap().count(), 0);
    }

    #[test]
    fn test_registration_installs_into_current_bucket() {
        let store = RotationStore::new(0);
        let id = store.register("late", AggregationKind::Sum, "", HashMap::new());

        assert!(store.observe_persistent(id, AggregationKind::Sum, 2.0).is_ok());
        assert_eq!(store.current().persistent(id).unwrap().sum(), 2.0);
    }

    #[test]
    fn test_unknown_identity_is_reported() {
        let store = RotationStore::new(0);
        let err = store
            .observe_persistent(MetricId(42), AggregationKind::Sum, 1.0)
            .unwrap_err();
        assert!(matches!(err, MonitorError::UnknownMetric { id: 42 }));
    }

    #[test]
    fn test_history_boundaries() {
        let depth = 3;
        let store = RotationStore::new(depth);
        let mut retired = Vec::new();

        for i in 0..6 {
            store.observe_adhoc("round", f64::from(i));
            retired.push(store.rotate());
        }

        // Most recent retired bucket
        assert!(Arc::ptr_eq(&store.history_at(0).unwrap(), &retired[5]));
        // Oldest still retained
        assert!(Arc::ptr_eq(&store.history_at(depth).unwrap(), &retired[2]));
        assert_eq!(store.history_at(depth).unwrap().adhoc("round"), Some(2.0));
        // One past the boundary is absent, not wrapped
        assert!(store.history_at(depth + 1).is_none());
        assert!(store.require_history(depth + 1).is_err());
    }

    #[test]
    fn test_history_unpopulated_slots_are_absent() {
        let store = RotationStore::new(4);
        assert!(store.history_at(0).is_none());

        store.rotate();
        store.rotate();

        assert!(store.history_at(1).is_some());
        assert!(store.history_at(2).is_none());
        assert!(store.history_at(4).is_none());
    }

    #[test]
    fn test_zero_depth_keeps_only_latest() {
        let store = RotationStore::new(0);
        let first = store.rotate();
        let second = store.rotate();

        assert!(Arc::ptr_eq(&store.history_at(0).unwrap(), &second));
        assert!(!Arc::ptr_eq(&store.history_at(0).unwrap(), &first));
        assert!(store.history_at(1).is_none());
    }

    #[test]
    fn test_oversized_depth_is_capped() {
        let store = RotationStore::new(usize::MAX);
        assert_eq!(store.depth(), MAX_HISTORY_DEPTH);

        store.rotate();
        assert!(store.history_at(0).is_some());
        assert!(store.history_at(usize::MAX).is_none());
    }

    #[test]
    fn test_rotation_never_drops_observations() {
        let store = Arc::new(RotationStore::new(1));
        let per_thread = 2000;
        let threads = 8;
        let mut handles = vec![];

        for t in 0..threads {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..per_thread {
                    store.observe_adhoc("x", f64::from(t * per_thread + i));
                }
            }));
        }

        let retired = store.rotate();
        for handle in handles {
            handle.join().unwrap();
        }

        let n = f64::from(threads * per_thread);
        let expected = n * (n - 1.0) / 2.0;
        let total = retired.adhoc("x").unwrap_or(0.0) + store.current().adhoc("x").unwrap_or(0.0);
        assert_eq!(total, expected);
    }

    #[test]
    fn test_concurrent_registration_and_rotation() {
        let store = Arc::new(RotationStore::new(2));
        let mut handles = vec![];

        for t in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let name = format!("metric.{}.{}", t, i % 20);
                    let id = store.register(&name, AggregationKind::Count, "", HashMap::new());
                    store
                        .observe_persistent(id, AggregationKind::Count, 1.0)
                        .expect("slot exists for every resolvable metric");
                }
            }));
        }
        for _ in 0..50 {
            store.rotate();
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.registry().len(), 80);
        assert_eq!(store.current().size(), 80);
    }
}
