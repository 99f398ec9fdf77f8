//! Local store contract
//!
//! The uniform interface the coordinator speaks to every slice's local
//! store. Each call is independent per slice: commit and rollback carry no
//! prepare phase, so cross-slice atomicity is best-effort by design.

pub mod memory;

use std::sync::Arc;

use crate::data::{Row, Value};
use crate::object::ManagedObject;
use crate::{Result, SliceError};

pub use memory::MemoryStore;

/// A query already translated for slice-local execution.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl TranslatedQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// A lazy, finite, forward-only stream of result rows from one slice.
///
/// Dropping the stream releases the underlying resources.
pub type RowStream = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// A failure attributed to one slice, as collected during fan-out
/// operations that must not stop at the first error.
#[derive(Debug)]
pub struct SliceFailure {
    pub slice: String,
    pub error: SliceError,
}

impl SliceFailure {
    pub fn new(slice: impl Into<String>, error: SliceError) -> Self {
        Self {
            slice: slice.into(),
            error,
        }
    }
}

/// Contract each physical slice's local store implements.
///
/// `flush` reports per-object failures as a collection instead of erroring
/// out, mirroring how the coordinator aggregates partial failures across
/// slices. All other operations use ordinary `Result` propagation.
pub trait SliceStore: Send + Sync {
    /// Connectivity probe. Called once at startup and when a slice is added
    /// at runtime.
    fn probe(&self) -> Result<()>;

    /// Write the given objects into this slice. Returns one error per
    /// failed object; an empty collection means full success.
    fn flush(&self, objects: &[Arc<ManagedObject>]) -> Vec<SliceError>;

    /// Execute a translated query, returning a lazy row stream. The stream
    /// is locally sorted whenever the logical query carries sort keys.
    fn execute_query(&self, query: &TranslatedQuery) -> Result<RowStream>;

    /// Commit this slice's local transaction. No prepare phase.
    fn commit(&self) -> Result<()>;

    /// Roll back this slice's local transaction.
    fn rollback(&self) -> Result<()>;

    /// Next value of a named sequence. Only ever invoked on the master
    /// slice.
    fn next_sequence(&self, name: &str) -> Result<u64>;

    /// Release resources held by this store. Called when the logical
    /// virtual connection closes; errors are aggregated by the caller.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory producing a store handle for a slice definition.
pub type StoreFactory = dyn Fn(&crate::config::SliceDef) -> Result<Arc<dyn SliceStore>> + Send + Sync;
