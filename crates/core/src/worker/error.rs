//! Error types for worker round trips.

use thiserror::Error;

use crate::engine::EngineError;

/// Errors from a request/response round trip with a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// No correlated response arrived in time, on any attempt.
    #[error("Worker did not respond within {timeout_ms} ms after {attempts} attempts")]
    Timeout { attempts: u32, timeout_ms: u64 },

    /// The worker thread is gone.
    #[error("Worker disconnected")]
    Disconnected,

    /// The engine answered with an error.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl WorkerError {
    /// Whether the failure came from waiting rather than from the engine.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
