//! Error types for the codec engine boundary.

use thiserror::Error;

/// Errors reported by a codec engine.
///
/// Engine errors cross thread boundaries inside worker responses, so they
/// carry only owned strings and are cheaply cloneable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine could not be started.
    #[error("Engine initialization failed: {0}")]
    Initialization(String),

    /// Input bytes could not be parsed.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Output generation failed.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// The engine finished but produced no bytes.
    #[error("Engine produced empty output")]
    EmptyOutput,

    /// The input carries no embedded preview.
    #[error("No embedded preview found")]
    NoPreview,

    /// The engine does not handle the requested format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The engine panicked while handling a request.
    #[error("Engine crashed: {0}")]
    Crashed(String),
}

impl EngineError {
    /// Creates a decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode(reason.into())
    }

    /// Creates an encode error.
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode(reason.into())
    }
}
