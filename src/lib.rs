//! SliceBase Distributed Store Coordinator
//!
//! Treats a set of independent physical databases ("slices") as one logical
//! store. The coordinator decides which slice(s) own a managed object,
//! partitions pending writes by destination slice, fans queries out to all
//! target slices in parallel, and merges the per-slice result streams back
//! into a single logical result.

pub mod config;
pub mod coordinator;
pub mod data;
pub mod flush;
pub mod object;
pub mod pool;
pub mod query;
pub mod slice;
pub mod store;

// Re-export main types
pub use config::{DistributedConfig, SliceDef};
pub use coordinator::DistributedStoreManager;
pub use data::{Row, Value};
pub use object::{ManagedObject, SliceAssignment};
pub use query::{MergedRows, SliceQuery};
pub use slice::{Slice, SliceRegistry, SliceStatus};
pub use store::{SliceFailure, SliceStore};

/// Coordinator error type
#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot connect to slice '{slice}': {reason}")]
    Connect { slice: String, reason: String },

    #[error("Slice not found: {0}")]
    SliceNotFound(String),

    #[error("No active slice available")]
    NoActiveSlice,

    #[error("{policy} returned no slice for {candidate}")]
    EmptyPolicyResult {
        policy: &'static str,
        candidate: String,
    },

    #[error("{policy} returned unknown slice '{slice}'")]
    UnknownPolicySlice {
        policy: &'static str,
        slice: String,
    },

    #[error("Store error on slice '{slice}': {reason}")]
    Store { slice: String, reason: String },

    #[error("Query failed on slice '{slice}': {reason}")]
    Query { slice: String, reason: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SliceError>;
