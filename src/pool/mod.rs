//! Worker pool
//!
//! Bounded executor shared by the flush coordinator and the query fan-out
//! path. An explicit object rather than a process-wide pool, so embedders
//! size it once and tests can substitute the serial variant for
//! deterministic scheduling. Callers block until every submitted task of
//! one logical operation has finished; there is no mid-flight cancellation.

use rayon::prelude::*;

use crate::{Result, SliceError};

/// Bounded pool of OS-level workers.
pub struct WorkerPool {
    inner: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    /// Pool with the given number of workers; zero means one per available
    /// CPU core.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("slice-worker-{}", i))
            .build()
            .map_err(|e| SliceError::Internal(format!("worker pool: {}", e)))?;
        Ok(Self { inner: Some(pool) })
    }

    /// Pool that runs every task inline on the calling thread, in
    /// submission order.
    pub fn serial() -> Self {
        Self { inner: None }
    }

    /// Run all tasks to completion and return their results in submission
    /// order. Blocks until the last task finishes.
    pub fn run_all<T, F>(&self, tasks: Vec<F>) -> Vec<T>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match &self.inner {
            Some(pool) => pool.install(|| tasks.into_par_iter().map(|task| task()).collect()),
            None => tasks.into_iter().map(|task| task()).collect(),
        }
    }

    /// Number of workers, or 1 for the serial pool.
    pub fn workers(&self) -> usize {
        self.inner.as_ref().map_or(1, |p| p.current_num_threads())
    }
}

// ============================================================================
// Tests
// ============================================================================
