//! In-memory store adapter
//!
//! Reference implementation of the [`SliceStore`] contract backed by plain
//! vectors. Used by embedding tests and as the template for real adapters:
//! flush stages writes, commit makes them durable, rollback discards them.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use super::{RowStream, SliceStore, TranslatedQuery};
use crate::data::Row;
use crate::object::ManagedObject;
use crate::{Result, SliceError};

/// A volatile slice store.
pub struct MemoryStore {
    name: String,
    /// Queryable rows, in insertion order.
    rows: RwLock<Vec<Row>>,
    /// Object ids staged by flush, not yet committed.
    staged: RwLock<Vec<u64>>,
    /// Object ids made durable by commit.
    committed: RwLock<Vec<u64>>,
    /// Named sequence counters.
    sequences: Mutex<AHashMap<String, u64>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            rows: RwLock::new(Vec::new()),
            staged: RwLock::new(Vec::new()),
            committed: RwLock::new(Vec::new()),
            sequences: Mutex::new(AHashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seed a result row, preserving insertion order. Callers that want a
    /// locally sorted stream insert rows in sorted order.
    pub fn insert_row(&self, row: Row) {
        self.rows.write().push(row);
    }

    /// Object ids staged by flush but not yet committed.
    pub fn staged_ids(&self) -> Vec<u64> {
        self.staged.read().clone()
    }

    /// Object ids made durable by commit.
    pub fn committed_ids(&self) -> Vec<u64> {
        self.committed.read().clone()
    }
}

impl SliceStore for MemoryStore {
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn flush(&self, objects: &[Arc<ManagedObject>]) -> Vec<SliceError> {
        let mut staged = self.staged.write();
        for object in objects {
            staged.push(object.id());
            // optimistic version bump, as a versioned entity store would
            object.set_version(object.version() + 1);
        }
        Vec::new()
    }

    fn execute_query(&self, _query: &TranslatedQuery) -> Result<RowStream> {
        let rows = self.rows.read().clone();
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn commit(&self) -> Result<()> {
        let mut staged = self.staged.write();
        self.committed.write().append(&mut staged);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.staged.write().clear();
        Ok(())
    }

    fn next_sequence(&self, name: &str) -> Result<u64> {
        let mut sequences = self.sequences.lock();
        let counter = sequences.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn close(&self) -> Result<()> {
        let staged = self.staged.read();
        if !staged.is_empty() {
            return Err(SliceError::Store {
                slice: self.name.clone(),
                reason: format!("closed with {} uncommitted writes", staged.len()),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
