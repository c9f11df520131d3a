//! Magick pipeline: full decode and re-encode on the general engine.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::{
    EncodedImage, EngineError, GeneralEngine, ImageEngine, ImageFormat, ImageGuard, InputFile,
};
use crate::job::JobStatus;
use crate::pool::{Dispatcher, PoolSettings, PoolStatus, WorkerPool};
use crate::worker::{EngineFactory, WorkerEngine};

use super::config::MagickConfig;
use super::error::ConversionError;
use super::traits::Pipeline;
use super::types::{ConversionResult, PartialConversion, PipelineJob};

pub const MAGICK_PIPELINE: &str = "magick";

/// A decode-transform-encode request for a general worker.
#[derive(Debug, Clone)]
pub struct MagickRequest {
    pub bytes: Bytes,
    /// Source format derived from the file name, if known.
    pub source_hint: Option<ImageFormat>,
    /// Format to encode; always directly writable.
    pub target: ImageFormat,
    pub quality: f32,
}

/// Worker-side half of the magick pipeline.
pub struct MagickWorker {
    engine: Box<dyn GeneralEngine>,
}

impl MagickWorker {
    pub fn new(engine: impl GeneralEngine) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    fn decode(&mut self, request: &MagickRequest) -> Result<ImageGuard, EngineError> {
        match self.engine.decode(&request.bytes, request.source_hint) {
            Ok(image) => Ok(ImageGuard::new(image)),
            Err(e) if request.source_hint.is_some() => {
                debug!(error = %e, "Decode with format hint failed, retrying with auto-detect");
                self.engine.decode(&request.bytes, None).map(ImageGuard::new)
            }
            Err(e) => Err(e),
        }
    }
}

impl WorkerEngine for MagickWorker {
    type Request = MagickRequest;
    type Response = EncodedImage;

    fn handle(&mut self, request: MagickRequest) -> Result<EncodedImage, EngineError> {
        let mut image = self.decode(&request)?;
        image.auto_orient()?;
        if let Some((max_width, max_height)) = request.target.max_dimensions() {
            if image.width() > max_width || image.height() > max_height {
                image.resize(max_width, max_height)?;
            }
        }
        image.set_quality(request.quality);

        let bytes = image.encode(request.target)?;
        if bytes.is_empty() {
            return Err(EngineError::EmptyOutput);
        }
        Ok(EncodedImage {
            bytes,
            width: image.width(),
            height: image.height(),
            format: request.target,
        })
    }
}

/// General pipeline covering the full format matrix.
///
/// Targets the engine cannot write directly are produced in their substitute
/// format and reported as [`ConversionResult::PartialSuccess`].
pub struct MagickPipeline {
    config: MagickConfig,
    dispatcher: Dispatcher<MagickWorker>,
}

impl MagickPipeline {
    /// Creates a pipeline whose workers each build an engine with `factory`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<E, F>(config: MagickConfig, factory: F) -> Self
    where
        E: GeneralEngine,
        F: Fn() -> Result<E, EngineError> + Send + Sync + 'static,
    {
        let factory: EngineFactory<MagickWorker> =
            Arc::new(move || factory().map(MagickWorker::new));
        let settings = PoolSettings::new(
            MAGICK_PIPELINE,
            config.max_workers,
            config.response_timeout(),
        );
        Self {
            dispatcher: Dispatcher::spawn(WorkerPool::new(settings, factory)),
            config,
        }
    }

    /// Pipeline on the built-in `image` crate engine.
    pub fn with_default_engine(config: MagickConfig) -> Self {
        Self::new(config, || Ok(ImageEngine::new()))
    }

    pub fn config(&self) -> &MagickConfig {
        &self.config
    }

    /// Format the engine will actually write for `target`.
    fn producible(target: ImageFormat) -> Option<ImageFormat> {
        if target.is_general_writable() {
            Some(target)
        } else {
            target.substitute()
        }
    }
}

#[async_trait]
impl Pipeline for MagickPipeline {
    fn name(&self) -> &str {
        MAGICK_PIPELINE
    }

    fn can_handle(&self, file: &InputFile, target: ImageFormat) -> bool {
        file.format().is_some_and(|f| f.is_general_readable())
            && Self::producible(target).is_some()
    }

    async fn submit(
        &self,
        job: PipelineJob,
        progress_tx: mpsc::Sender<JobStatus>,
    ) -> ConversionResult {
        let Some(produced) = Self::producible(job.target) else {
            return ConversionResult::Failure(ConversionError::unsupported(format!(
                "cannot write {}",
                job.target
            )));
        };

        let request = MagickRequest {
            bytes: job.file.bytes().clone(),
            source_hint: job.file.format(),
            target: produced,
            quality: job.quality,
        };
        let image = match self
            .dispatcher
            .execute(job.job_id.to_string(), request, Some(progress_tx))
            .await
        {
            Ok(image) => image,
            Err(e) => {
                debug!(job_id = %job.job_id, error = %e, "General conversion failed");
                return ConversionResult::Failure(e.into());
            }
        };

        if produced == job.target {
            return ConversionResult::Success(image);
        }
        debug!(
            job_id = %job.job_id,
            requested = %job.target,
            produced = %produced,
            "Target produced through substitute format"
        );
        ConversionResult::PartialSuccess(PartialConversion {
            intermediate_file: InputFile::new(job.file.output_name(produced), image.bytes),
            intermediate_format: produced,
            requested_format: job.target,
        })
    }

    fn preload(&self) {
        self.dispatcher.preload();
    }

    async fn status(&self) -> Option<PoolStatus> {
        self.dispatcher.status().await
    }
}
