//! Testing utilities and mock implementations.
//!
//! Mock engines run inside real worker pools and pipelines; the scripted
//! [`MockPipeline`] drives the orchestrator without any workers at all.
//!
//! # Example
//!
//! ```rust,ignore
//! use rawshift_core::testing::{fixtures, MockGeneralEngine};
//!
//! let engine = MockGeneralEngine::new().failing_with_hint();
//! let stats = engine.stats();
//! let magick = MagickPipeline::new(MagickConfig::default(), move || Ok(engine.clone()));
//!
//! let result = magick.submit(fixtures::pipeline_job(fixtures::png_file("a.png", 64, 64), ImageFormat::Jpeg), tx).await;
//! assert_eq!(stats.decodes.load(Ordering::SeqCst), 2);
//! ```

mod mock_codec;
mod mock_engines;
mod mock_pipeline;

pub use mock_codec::{mock_encoded_bytes, mock_image_bytes, parse_mock_image, MockRasterCodec};
pub use mock_engines::{MockGeneralEngine, MockPreviewEngine, MockStats};
pub use mock_pipeline::{MockPipeline, RecordedPass};

/// Test fixtures and helper functions.
pub mod fixtures {
    use uuid::Uuid;

    use super::mock_image_bytes;
    use crate::engine::{EncodedImage, ImageFormat, InputFile};
    use crate::pipeline::{ConversionResult, PartialConversion, PipelineJob};

    /// A RAW file whose content decodes as a 6000x4000 mock image.
    pub fn raw_file(name: &str) -> InputFile {
        InputFile::new(name, mock_image_bytes(6000, 4000))
    }

    /// A non-RAW file whose content is a mock image of the given size.
    pub fn png_file(name: &str, width: u32, height: u32) -> InputFile {
        InputFile::new(name, mock_image_bytes(width, height))
    }

    /// A single pipeline pass at full quality.
    pub fn pipeline_job(file: InputFile, target: ImageFormat) -> PipelineJob {
        PipelineJob {
            job_id: Uuid::new_v4(),
            file,
            target,
            quality: 1.0,
        }
    }

    /// A successful pass result.
    pub fn success(width: u32, height: u32, format: ImageFormat) -> ConversionResult {
        ConversionResult::Success(EncodedImage {
            bytes: super::mock_encoded_bytes(width, height, format),
            width,
            height,
            format,
        })
    }

    /// A partial pass result that produced `intermediate` for `requested`.
    pub fn partial(
        name: &str,
        intermediate: ImageFormat,
        requested: ImageFormat,
    ) -> ConversionResult {
        ConversionResult::PartialSuccess(PartialConversion {
            intermediate_file: InputFile::new(name, mock_image_bytes(800, 600)),
            intermediate_format: intermediate,
            requested_format: requested,
        })
    }
}
