//! Query fan-out
//!
//! Submits a translated query to every target slice concurrently, waits for
//! all of them, and hands the per-slice streams to the merger. Unlike
//! flush, a partial query answer is useless: any per-slice failure is fatal
//! for the whole query, after the surviving streams are released.

pub mod merge;

use std::sync::Arc;

use crate::data::Value;
use crate::pool::WorkerPool;
use crate::slice::assignment::AssignmentResolver;
use crate::slice::policy::validate_decision;
use crate::slice::registry::{Slice, SliceRegistry};
use crate::store::{RowStream, TranslatedQuery};
use crate::{Result, SliceError};

pub use merge::MergedRows;

// ============================================================================
// Query Model
// ============================================================================

/// One sort key of a query: column ordinal plus direction.
#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(column: usize) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn descending(column: usize) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Scalar aggregate operators the merger can re-combine across slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Max,
    Min,
    /// Not re-combinable from per-slice partials; reported as unsupported.
    Avg,
}

/// An aggregate projection column.
#[derive(Debug, Clone, Copy)]
pub struct AggregateSpec {
    pub column: usize,
    pub op: AggregateOp,
}

/// Offset/limit applied to the merged logical result, never per slice.
#[derive(Debug, Clone, Copy)]
pub struct QueryRange {
    pub offset: usize,
    pub limit: Option<usize>,
}

/// A logical query plus its fan-out and merge metadata.
#[derive(Debug, Clone)]
pub struct SliceQuery {
    pub statement: String,
    pub params: Vec<Value>,
    /// Entity type the query selects, when known; used for the
    /// replicated-type narrowing rule.
    pub candidate_type: Option<String>,
    /// Explicit caller-supplied target slices; narrows the policy result.
    pub target_hint: Option<Vec<String>>,
    pub sort_keys: Vec<SortKey>,
    pub aggregates: Vec<AggregateSpec>,
    pub range: Option<QueryRange>,
}

impl SliceQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
            candidate_type: None,
            target_hint: None,
            sort_keys: Vec::new(),
            aggregates: Vec::new(),
            range: None,
        }
    }

    pub fn params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn candidate(mut self, type_name: impl Into<String>) -> Self {
        self.candidate_type = Some(type_name.into());
        self
    }

    pub fn targets(mut self, names: Vec<String>) -> Self {
        self.target_hint = Some(names);
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    pub fn aggregate(mut self, column: usize, op: AggregateOp) -> Self {
        self.aggregates.push(AggregateSpec { column, op });
        self
    }

    pub fn range(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.range = Some(QueryRange { offset, limit });
        self
    }

    fn translated(&self) -> TranslatedQuery {
        TranslatedQuery::new(self.statement.clone()).with_params(self.params.clone())
    }
}

// ============================================================================
// Fan-Out Executor
// ============================================================================

/// Executes one logical query against all of its target slices.
pub struct FanOutExecutor {
    registry: Arc<SliceRegistry>,
    resolver: Arc<AssignmentResolver>,
    pool: Arc<WorkerPool>,
}

impl FanOutExecutor {
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

    /// Compute the target slices for a query.
    ///
    /// The query-target policy's decision is validated against the active
    /// set, then narrowed by the caller's hint when one matches. A
    /// replicated candidate type narrows to a single arbitrary active
    /// slice, since all replicas hold identical rows and querying more than
    /// one would duplicate results.
    pub fn targets(&self, query: &SliceQuery) -> Result<Vec<Arc<Slice>>> {
        let actives = self.registry.active_slices();
        let names = self.resolver.policies().query_target.targets(
            &query.statement,
            &actives,
            "query",
        );
        let mut names = validate_decision("QueryTargetPolicy", &query.statement, names, &actives)?;

        if let Some(hint) = &query.target_hint {
            let narrowed: Vec<String> = names
                .iter()
                .filter(|n| hint.contains(n))
                .cloned()
                .collect();
            // a hint matching nothing falls back to the policy decision
            if narrowed.is_empty() {
                log::debug!("target hint {:?} matches no active slice, ignored", hint);
            } else {
                names = narrowed;
            }
        }

        if let Some(candidate) = &query.candidate_type {
            if self.resolver.replicated().contains(candidate) {
                names.truncate(1);
            }
        }

        names
            .iter()
            .map(|name| self.registry.expect_slice(name))
            .collect()
    }

    /// Fan the query out, await every per-slice task, and merge.
    ///
    /// All tasks run to completion even when one fails; the first failure
    /// in slice order then propagates after the other streams are dropped.
    pub fn execute(&self, query: &SliceQuery) -> Result<MergedRows> {
        let targets = self.targets(query)?;
        log::debug!(
            "fanning out query to {} slice(s): {:?}",
            targets.len(),
            targets.iter().map(|s| s.name()).collect::<Vec<_>>()
        );

        let translated = query.translated();
        let tasks: Vec<_> = targets
            .iter()
            .map(|slice| {
                let slice = slice.clone();
                let translated = translated.clone();
                move || {
                    slice
                        .store()
                        .execute_query(&translated)
                        .map_err(|e| SliceError::Query {
                            slice: slice.name().to_string(),
                            reason: e.to_string(),
                        })
                }
            })
            .collect();

        let mut streams: Vec<RowStream> = Vec::with_capacity(targets.len());
        let mut first_error = None;
        for result in self.pool.run_all(tasks) {
            match result {
                Ok(stream) => streams.push(stream),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }
        if let Some(error) = first_error {
            // surviving streams drop here, releasing their resources
            drop(streams);
            return Err(error);
        }

        Ok(MergedRows::new(streams, query))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistributedConfig, SliceDef};
    use crate::data::Row;
    use crate::slice::assignment::ReplicatedTypes;
    use crate::slice::policy::PolicySet;
    use crate::store::memory::MemoryStore;
    use crate::store::SliceStore;

    /// A store whose queries always fail.
    struct BrokenQueryStore;

    impl SliceStore for BrokenQueryStore {
        fn probe(&self) -> Result<()> {
            Ok(())
        }
        fn flush(&self, _: &[Arc<crate::object::ManagedObject>]) -> Vec<SliceError> {
            Vec::new()
        }
        fn execute_query(&self, _: &TranslatedQuery) -> Result<RowStream> {
            Err(SliceError::Internal("disk on fire".into()))
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

    fn executor(names: &[&str], broken: &[&str], replicated: &[&str]) -> FanOutExecutor {
        let defs = names.iter().map(|n| SliceDef::new(*n)).collect();
        let broken: Vec<String> = broken.iter().map(|s| s.to_string()).collect();
        let factory = move |def: &SliceDef| -> Result<Arc<dyn SliceStore>> {
            if broken.contains(&def.name) {
                Ok(Arc::new(BrokenQueryStore))
            } else {
                let store = MemoryStore::new(&def.name);
                store.insert_row(vec![Value::Str(def.name.clone())]);
                Ok(store as Arc<dyn SliceStore>)
            }
        };
        let registry =
            Arc::new(SliceRegistry::open(&DistributedConfig::new(defs), &factory).unwrap());
        let resolver = Arc::new(AssignmentResolver::new(
            registry.clone(),
            PolicySet::default(),
            ReplicatedTypes::new(replicated.iter().map(|s| s.to_string())),
        ));
        FanOutExecutor::new(registry, resolver, Arc::new(WorkerPool::new(4).unwrap()))
    }

    fn names(targets: &[Arc<Slice>]) -> Vec<&str> {
        targets.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_targets_default_to_all_active() {
        let executor = executor(&["a", "b", "c"], &[], &[]);
        let query = SliceQuery::new("SELECT * FROM orders");
        assert_eq!(
            names(&executor.targets(&query).unwrap()),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_hint_narrows_targets() {
        let executor = executor(&["a", "b", "c"], &[], &[]);
        let query = SliceQuery::new("SELECT * FROM orders").targets(vec!["b".into()]);
        assert_eq!(names(&executor.targets(&query).unwrap()), vec!["b"]);
    }

    #[test]
    fn test_unmatched_hint_falls_back_to_all() {
        let executor = executor(&["a", "b"], &[], &[]);
        let query = SliceQuery::new("SELECT * FROM orders").targets(vec!["ghost".into()]);
        assert_eq!(names(&executor.targets(&query).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_replicated_candidate_narrows_to_one() {
        let executor = executor(&["a", "b", "c"], &[], &["app.Country"]);
        let query = SliceQuery::new("SELECT * FROM countries").candidate("app.Country");
        assert_eq!(executor.targets(&query).unwrap().len(), 1);
    }

    #[test]
    fn test_execute_merges_all_slices() {
        let executor = executor(&["a", "b"], &[], &[]);
        let query = SliceQuery::new("SELECT name FROM t");
        let rows: Vec<Row> = executor
            .execute(&query)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        // concatenation in slice-list order
        assert_eq!(
            rows,
            vec![vec![Value::Str("a".into())], vec![Value::Str("b".into())]]
        );
    }

    #[test]
    fn test_one_failure_fails_whole_query() {
        let executor = executor(&["a", "b", "c"], &["b"], &[]);
        let query = SliceQuery::new("SELECT name FROM t");
        match executor.execute(&query) {
            Err(SliceError::Query { slice, .. }) => assert_eq!(slice, "b"),
            other => panic!("expected query failure, got {:?}", other.map(|_| ())),
        }
    }
}
