//! Distributed store manager
//!
//! The facade the upstream persistence context talks to. Wires the registry,
//! routing, flush coordination and query fan-out together, and forwards the
//! transaction boundary (commit/rollback) to every slice independently:
//! there is no prepare phase, so cross-slice atomicity is best-effort.

use std::sync::Arc;

use crate::config::{DistributedConfig, SliceDef};
use crate::data::Row;
use crate::flush::FlushCoordinator;
use crate::object::{ManagedObject, SliceAssignment};
use crate::pool::WorkerPool;
use crate::query::{FanOutExecutor, MergedRows, SliceQuery};
use crate::slice::assignment::{AssignmentResolver, ReplicatedTypes};
use crate::slice::policy::{validate_decision, PolicySet};
use crate::slice::registry::{Slice, SliceRegistry};
use crate::store::{SliceFailure, StoreFactory};
use crate::Result;

/// Coordinator over all configured slices.
pub struct DistributedStoreManager {
    registry: Arc<SliceRegistry>,
    resolver: Arc<AssignmentResolver>,
    flusher: FlushCoordinator,
    executor: FanOutExecutor,
}

impl DistributedStoreManager {
    /// Build the whole coordinator: registry (with connectivity probes),
    /// routing, worker pool, flush and query paths.
    pub fn open(
        config: &DistributedConfig,
        factory: &StoreFactory,
        policies: PolicySet,
    ) -> Result<Self> {
        let registry = Arc::new(SliceRegistry::open(config, factory)?);
        let replicated = ReplicatedTypes::new(config.replicated_types.iter().cloned());
        let resolver = Arc::new(AssignmentResolver::new(
            registry.clone(),
            policies,
            replicated,
        ));
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);
        log::info!(
            "distributed store manager open: {} slice(s), {} worker(s)",
            registry.len(),
            pool.workers()
        );

        let flusher = FlushCoordinator::new(registry.clone(), resolver.clone(), pool.clone());
        let executor = FanOutExecutor::new(registry.clone(), resolver.clone(), pool);
        Ok(Self {
            registry,
            resolver,
            flusher,
            executor,
        })
    }

    pub fn registry(&self) -> &Arc<SliceRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<AssignmentResolver> {
        &self.resolver
    }

    /// Resolve (and cache) the owning slice(s) of a newly persisted object.
    pub fn save(&self, object: &ManagedObject) -> Result<SliceAssignment> {
        self.resolver.resolve(object, None, "save")
    }

    /// Flush a dirty set across all owning slices. Returns the aggregated
    /// per-partition failures; the caller decides whether the enclosing
    /// transaction aborts.
    pub fn flush(&self, dirty: &[Arc<ManagedObject>]) -> Result<Vec<SliceFailure>> {
        self.flusher.flush(dirty)
    }

    /// Execute a logical query across its target slices and merge.
    pub fn execute_query(&self, query: &SliceQuery) -> Result<MergedRows> {
        self.executor.execute(query)
    }

    /// Locate an object by probing the finder-target slices one at a time.
    ///
    /// The slice that yields the object is adopted as its origin
    /// assignment, so later operations route straight to it.
    pub fn find(&self, object: &ManagedObject, query: &SliceQuery) -> Result<Option<Row>> {
        let targets = match object.assignment() {
            // already routed: look only where the object lives
            Some(assignment) => assignment.slices().to_vec(),
            None => {
                let actives = self.registry.active_slices();
                let names = self.resolver.policies().finder_target.targets(
                    object.type_name(),
                    &actives,
                    "find",
                );
                validate_decision("FinderTargetPolicy", object.type_name(), names, &actives)?
            }
        };

        let translated = crate::store::TranslatedQuery::new(query.statement.clone())
            .with_params(query.params.clone());
        for name in targets {
            let slice = self.registry.expect_slice(&name)?;
            let mut stream = slice.store().execute_query(&translated)?;
            if let Some(row) = stream.next() {
                let row = row?;
                self.resolver.resolve(object, Some(&name), "find")?;
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Next value of a named sequence, generated on the master slice only.
    pub fn next_sequence(&self, name: &str) -> Result<u64> {
        let master = self.registry.master_slice()?;
        master.store().next_sequence(name)
    }

    /// Commit every slice's local transaction independently (no prepare
    /// phase), collecting per-slice failures instead of stopping early.
    pub fn commit(&self) -> Vec<SliceFailure> {
        self.for_each_active(|slice| slice.store().commit())
    }

    /// Roll back every slice's local transaction, collecting failures.
    pub fn rollback(&self) -> Vec<SliceFailure> {
        self.for_each_active(|slice| slice.store().rollback())
    }

    /// Close every slice's store, aggregating close-time errors the way a
    /// virtual connection must: every underlying handle gets closed even
    /// when an earlier one fails.
    pub fn close(&self) -> Vec<SliceFailure> {
        self.for_each_active(|slice| slice.store().close())
    }

    /// Add a slice at runtime and make it visible to subsequent operations.
    pub fn add_slice(&self, def: &SliceDef, factory: &StoreFactory) -> Result<Arc<Slice>> {
        self.registry.add_slice(def, factory)
    }

    fn for_each_active(&self, op: impl Fn(&Slice) -> Result<()>) -> Vec<SliceFailure> {
        let mut failures = Vec::new();
        for slice in self.registry.active_slices() {
            if let Err(e) = op(&slice) {
                failures.push(SliceFailure::new(slice.name(), e));
            }
        }
        failures
    }
}

// ============================================================================
// Tests
// ============================================================================
