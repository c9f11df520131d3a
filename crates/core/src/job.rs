//! Conversion job state shared by pipelines and the orchestrator.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::engine::{ImageFormat, InputFile};

/// Lifecycle of a conversion job.
///
/// Transitions only move forward: `Idle -> Pending -> Processing -> Done | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Pending => 1,
            Self::Processing => 2,
            Self::Done | Self::Error => 3,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Where a staged conversion came from.
///
/// Set on the first staging hop and kept for the rest of the job, so the
/// final result can be attributed to the file the caller submitted.
#[derive(Debug, Clone)]
pub struct PartialChain {
    /// The file the caller submitted.
    pub original_file: InputFile,
    /// The format the caller asked for.
    pub original_format: ImageFormat,
    /// The substitute format reached by the last hop.
    pub intermediate_format: ImageFormat,
    /// Staging hops taken so far.
    pub hops: u32,
}

/// A conversion request moving through the orchestrator.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Unique job ID.
    pub id: Uuid,
    /// Working input; replaced by the intermediate file while staging.
    pub file: InputFile,
    /// Working target format.
    pub target: ImageFormat,
    /// Encode quality in [0, 1].
    pub quality: f32,
    /// Present once the job has gone through a staging hop.
    pub partial_chain: Option<PartialChain>,
    status: JobStatus,
    started_at: Option<Instant>,
}

impl ConversionJob {
    /// Creates an idle job. Quality is clamped to [0, 1].
    pub fn new(file: InputFile, target: ImageFormat, quality: f32) -> Self {
        let quality = if quality.is_nan() {
            1.0
        } else {
            quality.clamp(0.0, 1.0)
        };
        Self {
            id: Uuid::new_v4(),
            file,
            target,
            quality,
            partial_chain: None,
            status: JobStatus::Idle,
            started_at: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Moves the job forward to `next`.
    ///
    /// Returns `false` (and changes nothing) for repeated or backward
    /// transitions. The first move into `Processing` starts the clock.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return false;
        }
        if next == JobStatus::Processing {
            self.started_at = Some(Instant::now());
        }
        self.status = next;
        true
    }

    /// Time since the job first started processing.
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// The file the caller submitted.
    pub fn original_file(&self) -> &InputFile {
        self.partial_chain
            .as_ref()
            .map(|chain| &chain.original_file)
            .unwrap_or(&self.file)
    }

    /// The format the caller asked for.
    pub fn requested_format(&self) -> ImageFormat {
        self.partial_chain
            .as_ref()
            .map(|chain| chain.original_format)
            .unwrap_or(self.target)
    }

    /// Staging hops taken so far.
    pub fn hops(&self) -> u32 {
        self.partial_chain.as_ref().map(|c| c.hops).unwrap_or(0)
    }

    /// Replaces the working input with an intermediate file.
    ///
    /// The first hop records the original file and format; later hops only
    /// update the intermediate format and hop count.
    pub fn stage(&mut self, intermediate: InputFile, intermediate_format: ImageFormat) {
        match self.partial_chain.as_mut() {
            Some(chain) => {
                chain.intermediate_format = intermediate_format;
                chain.hops += 1;
            }
            None => {
                self.partial_chain = Some(PartialChain {
                    original_file: self.file.clone(),
                    original_format: self.target,
                    intermediate_format,
                    hops: 1,
                });
            }
        }
        self.file = intermediate;
        self.target = intermediate_format;
    }
}
