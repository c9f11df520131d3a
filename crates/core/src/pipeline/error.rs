//! Conversion error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;
use crate::worker::WorkerError;

/// Why a conversion (or one pipeline's attempt at it) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// Neither pipeline accepts this file and target.
    #[error("Unsupported input: {reason}")]
    UnsupportedInput { reason: String },

    /// The engine could not parse the input, even after auto-detection.
    #[error("Failed to decode input: {reason}")]
    DecodeFailure { reason: String },

    /// The embedded preview is smaller than the minimum resolution.
    #[error("Image too small: {width}x{height} is below {min_resolution}px")]
    QualityTooLow {
        width: u32,
        height: u32,
        min_resolution: u32,
    },

    /// The worker never answered.
    #[error("Engine did not respond after {attempts} attempts of {timeout_ms} ms")]
    EngineTimeout { attempts: u32, timeout_ms: u64 },

    /// Output generation failed.
    #[error("Failed to encode output: {reason}")]
    EncodeFailure { reason: String },

    /// Staged conversion kept producing intermediates.
    #[error("Staged conversion exceeded {max_hops} hops")]
    StagingLimitExceeded { max_hops: u32 },

    /// Unclassified engine error, surfaced verbatim.
    #[error("{0}")]
    Unknown(String),
}

/// Serializable discriminant of a [`ConversionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedInput,
    DecodeFailure,
    QualityTooLow,
    EngineTimeout,
    EncodeFailure,
    StagingLimitExceeded,
    Unknown,
}

impl ConversionError {
    /// Creates an unsupported input error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            reason: reason.into(),
        }
    }

    /// Creates a decode failure.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::DecodeFailure {
            reason: reason.into(),
        }
    }

    /// Creates an encode failure.
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::EncodeFailure {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedInput { .. } => ErrorKind::UnsupportedInput,
            Self::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            Self::QualityTooLow { .. } => ErrorKind::QualityTooLow,
            Self::EngineTimeout { .. } => ErrorKind::EngineTimeout,
            Self::EncodeFailure { .. } => ErrorKind::EncodeFailure,
            Self::StagingLimitExceeded { .. } => ErrorKind::StagingLimitExceeded,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<EngineError> for ConversionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Decode(reason) => Self::DecodeFailure { reason },
            EngineError::NoPreview => Self::decode(EngineError::NoPreview.to_string()),
            EngineError::Encode(reason) => Self::EncodeFailure { reason },
            EngineError::EmptyOutput => Self::encode(EngineError::EmptyOutput.to_string()),
            EngineError::UnsupportedFormat(reason) => Self::UnsupportedInput { reason },
            other @ (EngineError::Initialization(_) | EngineError::Crashed(_)) => {
                Self::Unknown(other.to_string())
            }
        }
    }
}

impl From<WorkerError> for ConversionError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Timeout {
                attempts,
                timeout_ms,
            } => Self::EngineTimeout {
                attempts,
                timeout_ms,
            },
            WorkerError::Engine(e) => e.into(),
            WorkerError::Disconnected => Self::Unknown("worker disconnected".to_string()),
        }
    }
}
