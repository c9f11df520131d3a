//! Wire types exchanged with worker threads.

use std::fmt;
use uuid::Uuid;

use crate::engine::EngineError;

/// Tag matching a worker response to the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request posted to a worker thread.
#[derive(Debug, Clone)]
pub struct WorkerRequest<T> {
    pub id: CorrelationId,
    pub payload: T,
}

/// A response published on a worker's inbound stream.
#[derive(Debug, Clone)]
pub struct WorkerMessage<T> {
    pub id: CorrelationId,
    pub payload: Result<T, EngineError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }
}
