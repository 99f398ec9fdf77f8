//! Flush coordination
//!
//! Partitions a dirty-object set by destination slice and drives the
//! per-slice flushes: sequentially for partitions holding replicated
//! objects (so version rollback on partial failure stays well-defined),
//! concurrently for independent partitions. Failures are aggregated across
//! all partitions; a failing partition never stops the others from being
//! attempted.

use std::sync::Arc;

use ahash::AHashMap;

use crate::object::ManagedObject;
use crate::pool::WorkerPool;
use crate::slice::assignment::AssignmentResolver;
use crate::slice::registry::SliceRegistry;
use crate::store::SliceFailure;
use crate::{Result, SliceError};

// ============================================================================
// Partition
// ============================================================================

/// The subset of one flush's dirty objects destined for a single slice.
///
/// Insert-only; notes which members are replicated so the coordinator can
/// pick the sequential path and snapshot versions.
#[derive(Debug)]
pub struct Partition {
    slice: String,
    objects: Vec<Arc<ManagedObject>>,
    replicated: Vec<Arc<ManagedObject>>,
}

impl Partition {
    fn new(slice: impl Into<String>) -> Self {
        Self {
            slice: slice.into(),
            objects: Vec::new(),
            replicated: Vec::new(),
        }
    }

    fn add(&mut self, object: Arc<ManagedObject>, is_replicated: bool) {
        if is_replicated {
            self.replicated.push(object.clone());
        }
        self.objects.push(object);
    }

    pub fn slice(&self) -> &str {
        &self.slice
    }

    pub fn objects(&self) -> &[Arc<ManagedObject>] {
        &self.objects
    }

    pub fn contains_replicated(&self) -> bool {
        !self.replicated.is_empty()
    }

    pub fn contains(&self, object: &ManagedObject) -> bool {
        self.objects.iter().any(|o| o.id() == object.id())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// ============================================================================
// Flush Coordinator
// ============================================================================

/// Drives one logical transaction's writes across all owning slices.
pub struct FlushCoordinator {
    registry: Arc<SliceRegistry>,
    resolver: Arc<AssignmentResolver>,
    pool: Arc<WorkerPool>,
}

impl FlushCoordinator {
    pub fn new(
        registry: Arc<SliceRegistry>,
        resolver: Arc<AssignmentResolver>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            registry,
            resolver,
            pool,
        }
    }

    /// Separate the dirty set into per-slice partitions, in registry order.
    ///
    /// A replicated object lands in every partition its assignment names,
    /// once per slice; every other object lands in exactly one partition.
    /// A routing failure here is fatal: the partition map would be
    /// incomplete, so nothing is flushed.
    pub fn partition(&self, dirty: &[Arc<ManagedObject>]) -> Result<Vec<Partition>> {
        let mut by_slice: AHashMap<String, Partition> = AHashMap::new();
        for object in dirty {
            let assignment = self.resolver.resolve(object, None, "flush")?;
            let is_replicated = self.resolver.is_replicated(object);
            for name in assignment.slices() {
                by_slice
                    .entry(name.clone())
                    .or_insert_with(|| Partition::new(name.clone()))
                    .add(object.clone(), is_replicated);
            }
        }

        // registry order keeps sequential flushes and error reports stable
        let mut partitions = Vec::with_capacity(by_slice.len());
        for slice in self.registry.active_slices() {
            if let Some(partition) = by_slice.remove(slice.name()) {
                partitions.push(partition);
            }
        }
        // assignments validated against the active set, so nothing remains
        if !by_slice.is_empty() {
            let stray: Vec<String> = by_slice.into_keys().collect();
            return Err(SliceError::Internal(format!(
                "partition map names unknown slices: {:?}",
                stray
            )));
        }
        Ok(partitions)
    }

    /// Flush the dirty set, returning every per-partition failure.
    ///
    /// Partitions containing replicated objects run sequentially with
    /// version snapshot/restore; the rest fan out on the worker pool. All
    /// partitions are attempted regardless of individual failures
    /// (best-effort-all); only a routing failure aborts the whole flush.
    pub fn flush(&self, dirty: &[Arc<ManagedObject>]) -> Result<Vec<SliceFailure>> {
        let partitions = self.partition(dirty)?;
        let (sequential, concurrent): (Vec<Partition>, Vec<Partition>) = partitions
            .into_iter()
            .partition(|p| p.contains_replicated());

        let mut failures = Vec::new();

        for i in 0..sequential.len() {
            let partition = &sequential[i];
            let snapshot: AHashMap<u64, u64> = partition
                .replicated
                .iter()
                .map(|o| (o.id(), o.version()))
                .collect();

            match self.flush_one(partition) {
                Ok(errors) => failures.extend(errors),
                Err(e) => failures.push(SliceFailure::new(partition.slice(), e)),
            }

            // An object whose replicas are not all flushed yet must not keep
            // a version advanced by only some of them.
            let remaining = &sequential[i + 1..];
            for object in &partition.replicated {
                if remaining.iter().any(|p| p.contains(object)) {
                    object.set_version(snapshot[&object.id()]);
                }
            }
        }

        if !concurrent.is_empty() {
            log::debug!("flushing {} independent partitions in parallel", concurrent.len());
            let registry = &self.registry;
            let tasks: Vec<_> = concurrent
                .into_iter()
                .map(|partition| {
                    move || match Self::flush_partition(registry, &partition) {
                        Ok(errors) => errors,
                        Err(e) => vec![SliceFailure::new(partition.slice(), e)],
                    }
                })
                .collect();
            for errors in self.pool.run_all(tasks) {
                failures.extend(errors);
            }
        }

        if !failures.is_empty() {
            log::warn!("flush completed with {} partition failure(s)", failures.len());
        }
        Ok(failures)
    }

    fn flush_one(&self, partition: &Partition) -> Result<Vec<SliceFailure>> {
        Self::flush_partition(&self.registry, partition)
    }

    fn flush_partition(
        registry: &SliceRegistry,
        partition: &Partition,
    ) -> Result<Vec<SliceFailure>> {
        let slice = registry.expect_slice(partition.slice())?;
        let errors = slice.store().flush(partition.objects());
        Ok(errors
            .into_iter()
            .map(|e| SliceFailure::new(partition.slice(), e))
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistributedConfig, SliceDef};
    use crate::slice::assignment::ReplicatedTypes;
    use crate::slice::policy::{DistributionPolicy, PolicySet};
    use crate::slice::registry::Slice;
    use crate::store::memory::MemoryStore;
    use crate::store::{RowStream, SliceStore, TranslatedQuery};

    /// Deterministic policy: slice index = object id modulo slice count.
    struct ModuloDistribution;

    impl DistributionPolicy for ModuloDistribution {
        fn distribute(&self, object: &ManagedObject, actives: &[Arc<Slice>], _: &str) -> Vec<String> {
            let index = (object.id() as usize) % actives.len();
            vec![actives[index].name().to_string()]
        }
    }

    /// A store that rejects every flush.
    struct BrokenFlushStore {
        name: String,
    }

    impl SliceStore for BrokenFlushStore {
        fn probe(&self) -> Result<()> {
            Ok(())
        }
        fn flush(&self, objects: &[Arc<ManagedObject>]) -> Vec<SliceError> {
            vec![SliceError::Store {
                slice: self.name.clone(),
                reason: format!("rejected {} objects", objects.len()),
            }]
        }
        fn execute_query(&self, _: &TranslatedQuery) -> Result<RowStream> {
            Ok(Box::new(std::iter::empty()))
        }
        fn commit(&self) -> Result<()> {
            Ok(())
        }
        fn rollback(&self) -> Result<()> {
            Ok(())
        }
        fn next_sequence(&self, _: &str) -> Result<u64> {
            Ok(0)
        }
    }

    struct Fixture {
        coordinator: FlushCoordinator,
        stores: AHashMap<String, Arc<MemoryStore>>,
    }

    impl Fixture {
        fn staged(&self, name: &str) -> Vec<u64> {
            self.stores[name].staged_ids()
        }
    }

    fn fixture(names: &[&str], broken: &[&str], replicated: &[&str]) -> Fixture {
        let defs = names.iter().map(|n| SliceDef::new(*n)).collect();
        let stores: AHashMap<String, Arc<MemoryStore>> = names
            .iter()
            .filter(|n| !broken.contains(*n))
            .map(|n| (n.to_string(), MemoryStore::new(*n)))
            .collect();
        let healthy = stores.clone();
        let factory = move |def: &SliceDef| -> Result<Arc<dyn SliceStore>> {
            match healthy.get(&def.name) {
                Some(store) => Ok(store.clone() as Arc<dyn SliceStore>),
                None => Ok(Arc::new(BrokenFlushStore {
                    name: def.name.clone(),
                })),
            }
        };
        let registry =
            Arc::new(SliceRegistry::open(&DistributedConfig::new(defs), &factory).unwrap());
        let resolver = Arc::new(AssignmentResolver::new(
            registry.clone(),
            PolicySet::default().with_distribution(Box::new(ModuloDistribution)),
            ReplicatedTypes::new(replicated.iter().map(|s| s.to_string())),
        ));
        let coordinator =
            FlushCoordinator::new(registry, resolver, Arc::new(WorkerPool::new(4).unwrap()));
        Fixture {
            coordinator,
            stores,
        }
    }

    fn dirty(ids: &[u64], type_name: &str) -> Vec<Arc<ManagedObject>> {
        ids.iter()
            .map(|id| Arc::new(ManagedObject::new(*id, type_name)))
            .collect()
    }

    #[test]
    fn test_partition_completeness() {
        let fx = fixture(&["a", "b", "c"], &[], &[]);
        let objects = dirty(&[0, 1, 2, 3, 4, 5, 6], "app.Order");

        let partitions = fx.coordinator.partition(&objects).unwrap();
        let total: usize = partitions.iter().map(|p| p.len()).sum();
        assert_eq!(total, objects.len());

        // each object appears exactly once across all partitions
        for object in &objects {
            let hits = partitions.iter().filter(|p| p.contains(object)).count();
            assert_eq!(hits, 1, "object {} misplaced", object.id());
        }
        // modulo policy: a gets 0,3,6; b gets 1,4; c gets 2,5
        assert_eq!(partitions[0].len(), 3);
        assert_eq!(partitions[1].len(), 2);
        assert_eq!(partitions[2].len(), 2);
    }

    #[test]
    fn test_replicated_objects_in_every_partition() {
        let fx = fixture(&["a", "b", "c"], &[], &["app.Country"]);
        let mut objects = dirty(&[1, 2], "app.Order");
        objects.push(Arc::new(ManagedObject::new(100, "app.Country")));

        let partitions = fx.coordinator.partition(&objects).unwrap();
        assert_eq!(partitions.len(), 3);
        for partition in &partitions {
            assert!(partition.contains(&objects[2]));
            assert!(partition.contains_replicated());
            // exactly once per partition
            let hits = partition.objects().iter().filter(|o| o.id() == 100).count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn test_flush_applies_all_partitions() {
        let fx = fixture(&["a", "b"], &[], &[]);
        let objects = dirty(&[0, 1, 2, 3], "app.Order");

        let failures = fx.coordinator.flush(&objects).unwrap();
        assert!(failures.is_empty());

        let mut staged_a = fx.staged("a");
        let mut staged_b = fx.staged("b");
        staged_a.sort_unstable();
        staged_b.sort_unstable();
        assert_eq!(staged_a, vec![0, 2]);
        assert_eq!(staged_b, vec![1, 3]);
    }

    #[test]
    fn test_partial_failure_isolation() {
        // three independent partitions; the middle one fails
        let fx = fixture(&["a", "b", "c"], &["b"], &[]);
        let objects = dirty(&[0, 1, 2], "app.Order");

        let failures = fx.coordinator.flush(&objects).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].slice, "b");

        // the healthy partitions were still applied
        assert_eq!(fx.staged("a"), vec![0]);
        assert_eq!(fx.staged("c"), vec![2]);
    }

    #[test]
    fn test_replicated_flush_restores_version_for_remaining_replicas() {
        let fx = fixture(&["a", "b", "c"], &["b"], &["app.Country"]);
        let object = Arc::new(ManagedObject::new(7, "app.Country"));
        object.set_version(3);

        let failures = fx.coordinator.flush(&[object.clone()]).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].slice, "b");

        // a and c each flushed (and bumped) the object, but after the last
        // replica partition no restore applies; the version must reflect the
        // final replica's flush, not an intermediate partial bump
        assert_eq!(object.version(), 4);
    }

    #[test]
    fn test_replicated_version_snapshot_between_replicas() {
        // two replicas: after slice a flushes, the version is restored for
        // the pending partition on slice b
        let fx = fixture(&["a", "b"], &["b"], &["app.Country"]);
        let object = Arc::new(ManagedObject::new(7, "app.Country"));
        object.set_version(10);

        fx.coordinator.flush(&[object.clone()]).unwrap();
        // a bumped 10 -> 11, restore to 10 before b, b's flush failed and
        // left the version untouched
        assert_eq!(object.version(), 10);
    }

    #[test]
    fn test_routing_failure_aborts_flush() {
        struct NoDecision;
        impl DistributionPolicy for NoDecision {
            fn distribute(&self, _: &ManagedObject, _: &[Arc<Slice>], _: &str) -> Vec<String> {
                Vec::new()
            }
        }

        let defs = vec![SliceDef::new("a")];
        let factory = |def: &SliceDef| -> Result<Arc<dyn SliceStore>> {
            Ok(MemoryStore::new(&def.name))
        };
        let registry =
            Arc::new(SliceRegistry::open(&DistributedConfig::new(defs), &factory).unwrap());
        let resolver = Arc::new(AssignmentResolver::new(
            registry.clone(),
            PolicySet::default().with_distribution(Box::new(NoDecision)),
            ReplicatedTypes::default(),
        ));
        let coordinator =
            FlushCoordinator::new(registry, resolver, Arc::new(WorkerPool::serial()));

        let objects = dirty(&[1], "app.Order");
        assert!(matches!(
            coordinator.flush(&objects),
            Err(SliceError::EmptyPolicyResult { .. })
        ));
    }
}
