//! Preview pipeline: embedded preview extraction for camera RAW files.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{
    EmbeddedPreviewEngine, EncodedImage, EngineError, ImageFormat, ImageRasterCodec, InputFile,
    PreviewEngine, RasterCodec,
};
use crate::job::JobStatus;
use crate::pool::{Dispatcher, PoolSettings, PoolStatus, WorkerPool};
use crate::worker::{EngineFactory, WorkerEngine};

use super::config::PreviewConfig;
use super::error::ConversionError;
use super::traits::Pipeline;
use super::types::{ConversionResult, PipelineJob};

pub const PREVIEW_PIPELINE: &str = "preview";

/// Worker-side half of the preview pipeline: raw bytes in, preview bytes out.
pub struct PreviewWorker {
    engine: Box<dyn PreviewEngine>,
}

impl PreviewWorker {
    pub fn new(engine: impl PreviewEngine) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }
}

impl WorkerEngine for PreviewWorker {
    type Request = Bytes;
    type Response = Bytes;

    fn handle(&mut self, request: Bytes) -> Result<Bytes, EngineError> {
        let preview = self.engine.extract_preview(&request)?;
        if preview.is_empty() {
            return Err(EngineError::EmptyOutput);
        }
        Ok(preview)
    }
}

/// Fast pipeline for RAW inputs with browser-renderable targets.
///
/// Extraction runs on pooled workers. The quality gate and the re-encode to
/// the requested format run locally on the blocking thread pool.
pub struct PreviewPipeline {
    config: PreviewConfig,
    dispatcher: Dispatcher<PreviewWorker>,
    codec: Arc<dyn RasterCodec>,
}

impl PreviewPipeline {
    /// Creates a pipeline whose workers each build an engine with `factory`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new<E, F>(config: PreviewConfig, factory: F, codec: Arc<dyn RasterCodec>) -> Self
    where
        E: PreviewEngine,
        F: Fn() -> Result<E, EngineError> + Send + Sync + 'static,
    {
        let factory: EngineFactory<PreviewWorker> =
            Arc::new(move || factory().map(PreviewWorker::new));
        let settings = PoolSettings::new(
            PREVIEW_PIPELINE,
            config.max_workers,
            config.response_timeout(),
        );
        Self {
            dispatcher: Dispatcher::spawn(WorkerPool::new(settings, factory)),
            config,
            codec,
        }
    }

    /// Pipeline on the built-in embedded preview extractor.
    pub fn with_default_engine(config: PreviewConfig) -> Self {
        Self::new(
            config,
            || Ok(EmbeddedPreviewEngine::new()),
            Arc::new(ImageRasterCodec::new()),
        )
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }
}

/// Checks the preview against the minimum resolution, then re-encodes it.
fn finish_preview(
    codec: &dyn RasterCodec,
    preview: &[u8],
    target: ImageFormat,
    quality: f32,
    min_resolution: u32,
) -> Result<EncodedImage, ConversionError> {
    let (width, height) = codec.dimensions(preview)?;
    if width.max(height) < min_resolution {
        return Err(ConversionError::QualityTooLow {
            width,
            height,
            min_resolution,
        });
    }
    Ok(codec.encode(preview, target, quality)?)
}

#[async_trait]
impl Pipeline for PreviewPipeline {
    fn name(&self) -> &str {
        PREVIEW_PIPELINE
    }

    fn can_handle(&self, file: &InputFile, target: ImageFormat) -> bool {
        target.is_browser_renderable()
            && file
                .extension()
                .is_some_and(|ext| self.config.accepts_extension(&ext))
    }

    async fn submit(
        &self,
        job: PipelineJob,
        progress_tx: mpsc::Sender<JobStatus>,
    ) -> ConversionResult {
        let preview = match self
            .dispatcher
            .execute(job.job_id.to_string(), job.file.bytes().clone(), Some(progress_tx))
            .await
        {
            Ok(preview) => preview,
            Err(e) => {
                debug!(job_id = %job.job_id, error = %e, "Preview extraction failed");
                return ConversionResult::Failure(e.into());
            }
        };

        let codec = self.codec.clone();
        let min_resolution = self.config.min_resolution;
        let (target, quality) = (job.target, job.quality);
        let finished = tokio::task::spawn_blocking(move || {
            finish_preview(codec.as_ref(), &preview, target, quality, min_resolution)
        })
        .await;

        match finished {
            Ok(result) => result.into(),
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Preview encode task failed");
                ConversionResult::Failure(ConversionError::Unknown(format!(
                    "preview encode task failed: {e}"
                )))
            }
        }
    }

    fn preload(&self) {
        self.dispatcher.preload();
    }

    async fn status(&self) -> Option<PoolStatus> {
        self.dispatcher.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPreviewEngine, MockRasterCodec};
    use std::time::Duration;
    use uuid::Uuid;

    fn pipeline(engine: MockPreviewEngine) -> PreviewPipeline {
        let config = PreviewConfig::default().with_response_timeout(Duration::from_millis(200));
        PreviewPipeline::new(
            config,
            move || Ok(engine.clone()),
            Arc::new(MockRasterCodec),
        )
    }

    fn job(name: &str, target: ImageFormat) -> PipelineJob {
        PipelineJob {
            job_id: Uuid::new_v4(),
            file: InputFile::new(name, vec![0u8; 8]),
            target,
            quality: 1.0,
        }
    }

    #[tokio::test]
    async fn test_can_handle_requires_raw_and_renderable_target() {
        let pipeline = pipeline(MockPreviewEngine::with_preview(6000, 4000));
        let raw = InputFile::new("IMG_1.CR3", Vec::new());
        let png = InputFile::new("photo.png", Vec::new());

        assert!(pipeline.can_handle(&raw, ImageFormat::Jpeg));
        assert!(pipeline.can_handle(&raw, ImageFormat::Avif));
        assert!(!pipeline.can_handle(&raw, ImageFormat::Tiff));
        assert!(!pipeline.can_handle(&png, ImageFormat::Jpeg));
        assert!(!pipeline.can_handle(&InputFile::new("noext", Vec::new()), ImageFormat::Jpeg));
    }

    #[tokio::test]
    async fn test_large_preview_succeeds() {
        let pipeline = pipeline(MockPreviewEngine::with_preview(6000, 4000));
        let (tx, mut rx) = mpsc::channel(4);

        let result = pipeline.submit(job("a.cr3", ImageFormat::Jpeg), tx).await;
        let ConversionResult::Success(image) = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!((image.width, image.height), (6000, 4000));
        assert_eq!(image.format, ImageFormat::Jpeg);
        assert_eq!(rx.recv().await, Some(JobStatus::Processing));
    }

    #[tokio::test]
    async fn test_small_preview_fails_quality_gate() {
        let pipeline = pipeline(MockPreviewEngine::with_preview(1620, 1080));
        let (tx, _rx) = mpsc::channel(4);

        let result = pipeline.submit(job("a.nef", ImageFormat::Jpeg), tx).await;
        let ConversionResult::Failure(err) = result else {
            panic!("expected failure, got {result:?}");
        };
        assert_eq!(
            err,
            ConversionError::QualityTooLow {
                width: 1620,
                height: 1080,
                min_resolution: 3840
            }
        );
    }

    #[tokio::test]
    async fn test_missing_preview_is_decode_failure() {
        let pipeline = pipeline(MockPreviewEngine::failing());
        let (tx, _rx) = mpsc::channel(4);

        let result = pipeline.submit(job("a.dng", ImageFormat::Png), tx).await;
        assert!(matches!(
            result,
            ConversionResult::Failure(ConversionError::DecodeFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_stalled_engine_times_out_after_two_attempts() {
        let engine = MockPreviewEngine::with_preview(6000, 4000).with_delay(Duration::from_millis(500));
        let stats = engine.stats();
        let pipeline = pipeline(engine);
        let (tx, _rx) = mpsc::channel(4);

        let result = pipeline.submit(job("a.arw", ImageFormat::Jpeg), tx).await;
        assert!(matches!(
            result,
            ConversionResult::Failure(ConversionError::EngineTimeout { attempts: 2, .. })
        ));
        // Both attempts reached the engine; let the second one drain.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(stats.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
