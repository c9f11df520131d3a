//! Types exchanged between the orchestrator and its pipelines.

use uuid::Uuid;

use crate::engine::{EncodedImage, ImageFormat, InputFile};

use super::error::ConversionError;

/// One pass of a conversion, as handed to a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    /// ID of the conversion job this pass belongs to.
    pub job_id: Uuid,
    pub file: InputFile,
    pub target: ImageFormat,
    /// Encode quality in [0, 1].
    pub quality: f32,
}

/// The target could not be produced in one step.
///
/// Carries an intermediate file in a substitute format; the caller is
/// expected to continue from it.
#[derive(Debug, Clone)]
pub struct PartialConversion {
    pub intermediate_file: InputFile,
    pub intermediate_format: ImageFormat,
    pub requested_format: ImageFormat,
}

/// Outcome of a single pipeline pass.
#[derive(Debug, Clone)]
pub enum ConversionResult {
    Success(EncodedImage),
    PartialSuccess(PartialConversion),
    Failure(ConversionError),
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<Result<EncodedImage, ConversionError>> for ConversionResult {
    fn from(result: Result<EncodedImage, ConversionError>) -> Self {
        match result {
            Ok(image) => Self::Success(image),
            Err(e) => Self::Failure(e),
        }
    }
}
