//! Conversion orchestrator implementation.
//!
//! Each submitted job runs as its own task:
//! - Fast path first when the preview pipeline accepts the job; any fast
//!   failure falls back to the general pipeline
//! - A general failure is rescued by the fast path only if it was not tried
//! - Partial results are staged: the intermediate becomes the new input
//!   until a pass succeeds or the hop limit is reached

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{EncodedImage, ImageFormat, InputFile};
use crate::job::{ConversionJob, JobStatus};
use crate::pipeline::{
    ConversionError, ConversionResult, MagickPipeline, PartialConversion, Pipeline, PipelineJob,
    PreviewPipeline,
};

use super::config::OrchestratorConfig;
use super::types::{ConversionFailure, ConversionOutput, ConversionUpdate, OrchestratorStatus};

/// Where a job currently is within one pass through the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    TryFast,
    TryGeneral,
}

/// How one pass through the pipelines ended.
enum PassOutcome {
    Done { image: EncodedImage, pipeline: String },
    Partial(PartialConversion),
}

/// Routes conversion jobs between the fast and general pipelines.
#[derive(Clone)]
pub struct ConversionOrchestrator {
    config: OrchestratorConfig,
    fast: Arc<dyn Pipeline>,
    general: Arc<dyn Pipeline>,
}

impl ConversionOrchestrator {
    /// Create an orchestrator over two pipelines.
    pub fn new(
        config: OrchestratorConfig,
        fast: Arc<dyn Pipeline>,
        general: Arc<dyn Pipeline>,
    ) -> Self {
        Self {
            config,
            fast,
            general,
        }
    }

    /// Create an orchestrator on the built-in engines.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_default_engines(config: &Config) -> Self {
        Self::new(
            config.orchestrator.clone(),
            Arc::new(PreviewPipeline::with_default_engine(config.preview.clone())),
            Arc::new(MagickPipeline::with_default_engine(config.magick.clone())),
        )
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether the fast path is preferred by default.
    pub fn use_fast_path(&self) -> bool {
        self.config.use_fast_path
    }

    /// Submit a conversion and stream its updates.
    ///
    /// The stream ends after exactly one `Completed` or `Failed` update. The
    /// job runs to completion even if the stream is dropped.
    pub fn submit(
        &self,
        file: InputFile,
        target: ImageFormat,
        quality: f32,
        use_fast_path: bool,
    ) -> ReceiverStream<ConversionUpdate> {
        let job = self.new_job(file, target, quality);
        self.spawn_job(job, use_fast_path)
    }

    /// Submit a conversion and wait for its outcome.
    pub async fn convert(
        &self,
        file: InputFile,
        target: ImageFormat,
        quality: f32,
        use_fast_path: bool,
    ) -> Result<ConversionOutput, ConversionFailure> {
        let job = self.new_job(file, target, quality);
        let (job_id, file_name) = (job.id, job.file.name().to_string());
        let mut updates = self.spawn_job(job, use_fast_path);

        while let Some(update) = updates.next().await {
            match update {
                ConversionUpdate::Completed(output) => return Ok(output),
                ConversionUpdate::Failed(failure) => return Err(failure),
                ConversionUpdate::Pending | ConversionUpdate::Processing => {}
            }
        }
        Err(ConversionFailure::new(
            job_id,
            file_name,
            target,
            ConversionError::Unknown("job ended without a result".to_string()),
            Default::default(),
        ))
    }

    /// Start the first worker of each pipeline ahead of demand.
    pub fn preload_workers(&self) {
        debug!("Preloading workers");
        self.fast.preload();
        self.general.preload();
    }

    /// Whether the fast pipeline accepts this file and target.
    pub fn can_fast_path_convert(&self, file: &InputFile, target: ImageFormat) -> bool {
        self.fast.can_handle(file, target)
    }

    /// Pool status of both pipelines.
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            fast: self.fast.status().await,
            general: self.general.status().await,
        }
    }

    fn new_job(&self, file: InputFile, target: ImageFormat, quality: f32) -> ConversionJob {
        if !(0.0..=1.0).contains(&quality) {
            warn!(quality, file = %file.name(), "Quality outside [0, 1], clamping");
        }
        ConversionJob::new(file, target, quality)
    }

    fn spawn_job(&self, job: ConversionJob, use_fast_path: bool) -> ReceiverStream<ConversionUpdate> {
        let (updates_tx, updates_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run_job(job, use_fast_path, updates_tx).await });
        ReceiverStream::new(updates_rx)
    }

    async fn run_job(
        &self,
        mut job: ConversionJob,
        use_fast_path: bool,
        updates: mpsc::Sender<ConversionUpdate>,
    ) {
        if job.advance(JobStatus::Pending) {
            let _ = updates.try_send(ConversionUpdate::Pending);
        }
        debug!(
            job_id = %job.id,
            file = %job.file.name(),
            target = %job.target,
            use_fast_path,
            "Conversion submitted"
        );

        let update = match self.run_stages(&mut job, use_fast_path, &updates).await {
            Ok((image, pipeline)) => {
                job.advance(JobStatus::Done);
                ConversionUpdate::Completed(self.finish(&job, image, pipeline))
            }
            Err(error) => {
                job.advance(JobStatus::Error);
                warn!(
                    job_id = %job.id,
                    file = %job.original_file().name(),
                    error = %error,
                    "Conversion failed"
                );
                ConversionUpdate::Failed(ConversionFailure::new(
                    job.id,
                    job.original_file().name(),
                    job.requested_format(),
                    error,
                    job.elapsed(),
                ))
            }
        };
        let _ = updates.send(update).await;
    }

    /// Runs passes until one succeeds, staging through intermediates.
    async fn run_stages(
        &self,
        job: &mut ConversionJob,
        use_fast_path: bool,
        updates: &mpsc::Sender<ConversionUpdate>,
    ) -> Result<(EncodedImage, String), ConversionError> {
        loop {
            match self.run_pass(job, use_fast_path, updates).await? {
                PassOutcome::Done { image, pipeline } => return Ok((image, pipeline)),
                PassOutcome::Partial(partial) => {
                    if job.hops() >= self.config.max_staging_hops {
                        return Err(ConversionError::StagingLimitExceeded {
                            max_hops: self.config.max_staging_hops,
                        });
                    }
                    info!(
                        job_id = %job.id,
                        requested = %partial.requested_format,
                        intermediate = %partial.intermediate_format,
                        "Staging through intermediate format"
                    );
                    job.stage(partial.intermediate_file, partial.intermediate_format);
                }
            }
        }
    }

    /// One pass of the fallback state machine over the job's working file.
    async fn run_pass(
        &self,
        job: &mut ConversionJob,
        use_fast_path: bool,
        updates: &mpsc::Sender<ConversionUpdate>,
    ) -> Result<PassOutcome, ConversionError> {
        let fast_ok = self.fast.can_handle(&job.file, job.target);
        let general_ok = self.general.can_handle(&job.file, job.target);
        if !fast_ok && !general_ok {
            return Err(ConversionError::unsupported(format!(
                "cannot convert {} to {}",
                job.file.name(),
                job.target
            )));
        }

        let mut stage = if use_fast_path && fast_ok {
            Stage::TryFast
        } else {
            Stage::TryGeneral
        };
        let (mut fast_tried, mut general_tried) = (false, false);

        loop {
            let pipeline = match stage {
                Stage::TryFast => {
                    fast_tried = true;
                    &self.fast
                }
                Stage::TryGeneral => {
                    general_tried = true;
                    &self.general
                }
            };
            let result = if stage == Stage::TryGeneral && !general_ok {
                ConversionResult::Failure(ConversionError::unsupported(format!(
                    "{} cannot convert {} to {}",
                    pipeline.name(),
                    job.file.name(),
                    job.target
                )))
            } else {
                self.submit_pass(pipeline.as_ref(), job, updates).await
            };

            let error = match result {
                ConversionResult::Success(image) => {
                    return Ok(PassOutcome::Done {
                        image,
                        pipeline: pipeline.name().to_string(),
                    })
                }
                ConversionResult::PartialSuccess(partial) => {
                    return Ok(PassOutcome::Partial(partial))
                }
                ConversionResult::Failure(error) => error,
            };

            stage = match stage {
                Stage::TryFast if !general_tried => {
                    warn!(
                        job_id = %job.id,
                        file = %job.file.name(),
                        error = %error,
                        "Fast path failed, falling back to general pipeline"
                    );
                    Stage::TryGeneral
                }
                Stage::TryGeneral if !fast_tried && fast_ok => {
                    warn!(
                        job_id = %job.id,
                        file = %job.file.name(),
                        error = %error,
                        "General pipeline failed, trying fast path"
                    );
                    Stage::TryFast
                }
                _ => return Err(error),
            };
        }
    }

    /// Submits a pass and relays its progress until the result arrives.
    async fn submit_pass(
        &self,
        pipeline: &dyn Pipeline,
        job: &mut ConversionJob,
        updates: &mpsc::Sender<ConversionUpdate>,
    ) -> ConversionResult {
        let (progress_tx, mut progress_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let pass = PipelineJob {
            job_id: job.id,
            file: job.file.clone(),
            target: job.target,
            quality: job.quality,
        };
        debug!(job_id = %job.id, pipeline = %pipeline.name(), target = %job.target, "Submitting pass");

        let submit = pipeline.submit(pass, progress_tx);
        tokio::pin!(submit);
        loop {
            tokio::select! {
                result = &mut submit => {
                    while let Ok(status) = progress_rx.try_recv() {
                        Self::relay(job, status, updates);
                    }
                    return result;
                }
                Some(status) = progress_rx.recv() => Self::relay(job, status, updates),
            }
        }
    }

    fn relay(job: &mut ConversionJob, status: JobStatus, updates: &mpsc::Sender<ConversionUpdate>) {
        if status == JobStatus::Processing && job.advance(JobStatus::Processing) {
            let _ = updates.try_send(ConversionUpdate::Processing);
        }
    }

    fn finish(&self, job: &ConversionJob, image: EncodedImage, pipeline: String) -> ConversionOutput {
        let file = job.original_file().clone();
        let target_format = job.requested_format();
        let output = ConversionOutput {
            job_id: job.id,
            file_name: file.name().to_string(),
            output_name: file.output_name(target_format),
            output_size: image.bytes.len(),
            output_width: image.width,
            output_height: image.height,
            target_format,
            output_format: image.format,
            pipeline,
            time_taken: job.elapsed(),
            completed_at: Utc::now(),
            bytes: image.bytes,
            file,
        };
        info!(
            job_id = %output.job_id,
            file = %output.file_name,
            output = %output.output_name,
            pipeline = %output.pipeline,
            width = output.output_width,
            height = output.output_height,
            time_taken_ms = output.time_taken.as_millis() as u64,
            "Conversion completed"
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockPipeline};

    fn orchestrator(
        config: OrchestratorConfig,
        fast: &MockPipeline,
        general: &MockPipeline,
    ) -> ConversionOrchestrator {
        ConversionOrchestrator::new(config, Arc::new(fast.clone()), Arc::new(general.clone()))
    }

    fn pipelines() -> (MockPipeline, MockPipeline) {
        (
            MockPipeline::new("preview").accepting(&["cr3"]),
            MockPipeline::new("magick").accepting(&["cr3", "jpg", "png"]),
        )
    }

    #[tokio::test]
    async fn test_fast_success_skips_general() {
        let (fast, general) = pipelines();
        fast.push_result(fixtures::success(6000, 4000, ImageFormat::Jpeg));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let output = orchestrator
            .convert(fixtures::raw_file("IMG_0001.CR3"), ImageFormat::Jpeg, 1.0, true)
            .await
            .unwrap();
        assert_eq!(output.pipeline, "preview");
        assert_eq!(output.output_name, "IMG_0001.jpg");
        assert!(general.passes().is_empty());
    }

    #[tokio::test]
    async fn test_fast_failure_falls_back_to_general() {
        let (fast, general) = pipelines();
        fast.push_result(ConversionResult::Failure(ConversionError::QualityTooLow {
            width: 1620,
            height: 1080,
            min_resolution: 3840,
        }));
        general.push_result(fixtures::success(6000, 4000, ImageFormat::Jpeg));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let output = orchestrator
            .convert(fixtures::raw_file("a.cr3"), ImageFormat::Jpeg, 1.0, true)
            .await
            .unwrap();
        assert_eq!(output.pipeline, "magick");
        assert_eq!(fast.passes().len(), 1);
        assert_eq!(general.passes().len(), 1);
    }

    #[tokio::test]
    async fn test_general_failure_rescued_by_untried_fast_path() {
        let (fast, general) = pipelines();
        general.push_result(ConversionResult::Failure(ConversionError::decode("bad")));
        fast.push_result(fixtures::success(6000, 4000, ImageFormat::Jpeg));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let output = orchestrator
            .convert(fixtures::raw_file("a.cr3"), ImageFormat::Jpeg, 1.0, false)
            .await
            .unwrap();
        assert_eq!(output.pipeline, "preview");
        assert_eq!(general.passes().len(), 1);
        assert_eq!(fast.passes().len(), 1);
    }

    #[tokio::test]
    async fn test_no_second_fast_attempt_after_fallback() {
        let (fast, general) = pipelines();
        fast.push_result(ConversionResult::Failure(ConversionError::decode("no preview")));
        general.push_result(ConversionResult::Failure(ConversionError::encode("disk full")));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let failure = orchestrator
            .convert(fixtures::raw_file("a.cr3"), ImageFormat::Jpeg, 1.0, true)
            .await
            .unwrap_err();
        assert_eq!(failure.error, ConversionError::encode("disk full"));
        assert_eq!(fast.passes().len(), 1);
        assert_eq!(general.passes().len(), 1);
    }

    #[tokio::test]
    async fn test_rescue_failure_reports_last_error() {
        let (fast, general) = pipelines();
        general.push_result(ConversionResult::Failure(ConversionError::decode("bad")));
        fast.push_result(ConversionResult::Failure(ConversionError::QualityTooLow {
            width: 100,
            height: 100,
            min_resolution: 3840,
        }));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let failure = orchestrator
            .convert(fixtures::raw_file("a.cr3"), ImageFormat::Jpeg, 1.0, false)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, crate::pipeline::ErrorKind::QualityTooLow);
        assert_eq!(general.passes().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_input_touches_no_pipeline() {
        let (fast, general) = pipelines();
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let failure = orchestrator
            .convert(fixtures::png_file("notes.txt", 1, 1), ImageFormat::Jpeg, 1.0, true)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ConversionError::UnsupportedInput { .. }));
        assert!(fast.passes().is_empty());
        assert!(general.passes().is_empty());
    }

    #[tokio::test]
    async fn test_staging_restores_original_file() {
        let (fast, general) = pipelines();
        general.push_result(fixtures::partial("photo.png", ImageFormat::Png, ImageFormat::Svg));
        general.push_result(fixtures::success(800, 600, ImageFormat::Png));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let output = orchestrator
            .convert(fixtures::png_file("photo.jpg", 800, 600), ImageFormat::Svg, 0.9, true)
            .await
            .unwrap();
        assert_eq!(output.file_name, "photo.jpg");
        assert_eq!(output.file.name(), "photo.jpg");
        assert_eq!(output.output_name, "photo.svg");
        assert_eq!(output.target_format, ImageFormat::Svg);
        assert_eq!(output.output_format, ImageFormat::Png);

        let passes = general.passes();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].target, ImageFormat::Svg);
        assert_eq!(passes[1].file_name, "photo.png");
        assert_eq!(passes[1].target, ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_staging_failure_fails_parent() {
        let (fast, general) = pipelines();
        general.push_result(fixtures::partial("photo.png", ImageFormat::Png, ImageFormat::Svg));
        general.push_result(ConversionResult::Failure(ConversionError::encode("boom")));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let failure = orchestrator
            .convert(fixtures::png_file("photo.jpg", 8, 8), ImageFormat::Svg, 1.0, true)
            .await
            .unwrap_err();
        assert_eq!(failure.file_name, "photo.jpg");
        assert_eq!(failure.target_format, ImageFormat::Svg);
        assert_eq!(failure.kind, crate::pipeline::ErrorKind::EncodeFailure);
    }

    #[tokio::test]
    async fn test_staging_without_fast_path_restores_original_file() {
        let (fast, general) = pipelines();
        general.push_result(fixtures::partial("photo.png", ImageFormat::Png, ImageFormat::Svg));
        general.push_result(fixtures::success(800, 600, ImageFormat::Png));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let output = orchestrator
            .convert(fixtures::png_file("photo.jpg", 800, 600), ImageFormat::Svg, 0.9, false)
            .await
            .unwrap();
        assert_eq!(output.file.name(), "photo.jpg");
        assert_eq!(output.output_name, "photo.svg");
        assert_eq!(output.target_format, ImageFormat::Svg);
        assert_eq!(output.output_format, ImageFormat::Png);
        assert_eq!(output.pipeline, "magick");

        let passes = general.passes();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[1].file_name, "photo.png");
        assert_eq!(passes[1].target, ImageFormat::Png);
        assert!(fast.passes().is_empty());
    }

    #[tokio::test]
    async fn test_staging_failure_without_fast_path_fails_parent() {
        let (fast, general) = pipelines();
        general.push_result(fixtures::partial("photo.png", ImageFormat::Png, ImageFormat::Svg));
        general.push_result(ConversionResult::Failure(ConversionError::encode("boom")));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let failure = orchestrator
            .convert(fixtures::png_file("photo.jpg", 8, 8), ImageFormat::Svg, 1.0, false)
            .await
            .unwrap_err();
        assert_eq!(failure.file_name, "photo.jpg");
        assert_eq!(failure.target_format, ImageFormat::Svg);
        assert_eq!(failure.kind, crate::pipeline::ErrorKind::EncodeFailure);
        assert_eq!(general.passes().len(), 2);
        assert!(fast.passes().is_empty());
    }

    #[tokio::test]
    async fn test_staging_limit_is_enforced() {
        let (fast, general) = pipelines();
        for _ in 0..3 {
            general.push_result(fixtures::partial("photo.png", ImageFormat::Png, ImageFormat::Svg));
        }
        let config = OrchestratorConfig::default().with_max_staging_hops(1);
        let orchestrator = orchestrator(config, &fast, &general);

        let failure = orchestrator
            .convert(fixtures::png_file("photo.jpg", 8, 8), ImageFormat::Svg, 1.0, true)
            .await
            .unwrap_err();
        assert_eq!(
            failure.error,
            ConversionError::StagingLimitExceeded { max_hops: 1 }
        );
        assert_eq!(general.passes().len(), 2);
    }

    #[tokio::test]
    async fn test_updates_end_with_exactly_one_terminal() {
        let (fast, general) = pipelines();
        fast.push_result(ConversionResult::Failure(ConversionError::decode("x")));
        general.push_result(fixtures::success(10, 10, ImageFormat::Jpeg));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        let updates: Vec<_> = orchestrator
            .submit(fixtures::raw_file("a.cr3"), ImageFormat::Jpeg, 1.0, true)
            .collect()
            .await;

        assert!(matches!(updates.first(), Some(ConversionUpdate::Pending)));
        assert_eq!(updates.iter().filter(|u| u.is_terminal()).count(), 1);
        assert!(updates.last().is_some_and(|u| u.is_terminal()));
        let processing = updates
            .iter()
            .filter(|u| matches!(u, ConversionUpdate::Processing))
            .count();
        assert_eq!(processing, 1);
    }

    #[tokio::test]
    async fn test_quality_is_clamped() {
        let (fast, general) = pipelines();
        general.push_result(fixtures::success(10, 10, ImageFormat::Png));
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);

        orchestrator
            .convert(fixtures::png_file("a.jpg", 10, 10), ImageFormat::Png, 3.0, true)
            .await
            .unwrap();
        assert_eq!(general.passes()[0].quality, 1.0);
    }

    #[tokio::test]
    async fn test_can_fast_path_convert_delegates_to_fast_pipeline() {
        let (fast, general) = pipelines();
        let orchestrator = orchestrator(OrchestratorConfig::default(), &fast, &general);
        assert!(orchestrator.can_fast_path_convert(&fixtures::raw_file("a.cr3"), ImageFormat::Jpeg));
        assert!(!orchestrator.can_fast_path_convert(&fixtures::raw_file("a.png"), ImageFormat::Jpeg));
    }
}
