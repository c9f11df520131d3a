//! Types for the conversion orchestrator.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::{ImageFormat, InputFile};
use crate::pipeline::{ConversionError, ErrorKind};
use crate::pool::PoolStatus;

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// A finished conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub job_id: Uuid,
    /// The file the caller submitted, even when the job went through
    /// an intermediate format.
    #[serde(skip)]
    pub file: InputFile,
    pub file_name: String,
    /// Encoded output.
    #[serde(skip)]
    pub bytes: Bytes,
    /// Original stem plus the requested format's extension.
    pub output_name: String,
    pub output_size: usize,
    pub output_width: u32,
    pub output_height: u32,
    /// The format the caller asked for.
    pub target_format: ImageFormat,
    /// The format the bytes are actually encoded in. Differs from
    /// `target_format` when the target was reached through a substitute.
    pub output_format: ImageFormat,
    /// Pipeline that produced the final pass.
    pub pipeline: String,
    /// Time from first processing to completion.
    #[serde(rename = "time_taken_ms", serialize_with = "serialize_millis")]
    pub time_taken: Duration,
    pub completed_at: DateTime<Utc>,
}

/// A failed conversion.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{file_name}: {error}")]
pub struct ConversionFailure {
    pub job_id: Uuid,
    pub file_name: String,
    pub target_format: ImageFormat,
    #[serde(skip)]
    pub error: ConversionError,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(rename = "time_taken_ms", serialize_with = "serialize_millis")]
    pub time_taken: Duration,
}

impl ConversionFailure {
    pub fn new(
        job_id: Uuid,
        file_name: impl Into<String>,
        target_format: ImageFormat,
        error: ConversionError,
        time_taken: Duration,
    ) -> Self {
        Self {
            job_id,
            file_name: file_name.into(),
            target_format,
            kind: error.kind(),
            message: error.to_string(),
            error,
            time_taken,
        }
    }
}

/// An update on a submitted job.
///
/// Every job yields exactly one terminal update (`Completed` or `Failed`),
/// possibly preceded by `Pending` and `Processing`.
#[derive(Debug, Clone)]
pub enum ConversionUpdate {
    Pending,
    Processing,
    Completed(ConversionOutput),
    Failed(ConversionFailure),
}

impl ConversionUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Status of both pipelines' pools.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStatus {
    pub fast: Option<PoolStatus>,
    pub general: Option<PoolStatus>,
}
