//! Pool settings and status snapshots.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static settings of a worker pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Pool name, used in thread names and logs.
    pub name: String,
    /// Maximum number of worker slots.
    pub capacity: usize,
    /// Per-attempt response timeout for requests to a worker.
    pub response_timeout: Duration,
}

impl PoolSettings {
    pub fn new(name: impl Into<String>, capacity: usize, response_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            response_timeout,
        }
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Pool name.
    pub name: String,
    /// Maximum number of worker slots.
    pub capacity: usize,
    /// Worker slots created so far.
    pub slots: usize,
    /// Slots currently running a job.
    pub busy: usize,
    /// Jobs waiting for a slot.
    pub queued: usize,
    /// Jobs that finished successfully.
    pub total_processed: u64,
    /// Jobs that finished with an error.
    pub total_failed: u64,
}

/// Running counters kept by the dispatch loop.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    pub total_processed: u64,
    pub total_failed: u64,
}

impl PoolStats {
    pub fn record(&mut self, failed: bool) {
        if failed {
            self.total_failed += 1;
        } else {
            self.total_processed += 1;
        }
    }
}
