//! Worker pool behavior observed through the pipelines.

use std::sync::Arc;
use std::time::Duration;

use rawshift_core::{
    pipeline::{MagickConfig, MagickPipeline, Pipeline},
    testing::{fixtures, MockGeneralEngine},
    ConversionOrchestrator, ConversionResult, ImageFormat, OrchestratorConfig,
};
use tokio::sync::mpsc;

#[tokio::test]
async fn test_concurrent_jobs_never_exceed_capacity() {
    let engine = MockGeneralEngine::new().with_delay(Duration::from_millis(40));
    let stats = engine.stats();
    let pipeline = MagickPipeline::new(
        MagickConfig::default().with_max_workers(2),
        move || Ok(engine.clone()),
    );

    let jobs = (0..8).map(|n| {
        let (tx, _rx) = mpsc::channel(4);
        let job = fixtures::pipeline_job(
            fixtures::png_file(&format!("img-{n}.png"), 64, 64),
            ImageFormat::Jpeg,
        );
        pipeline.submit(job, tx)
    });
    let results = futures::future::join_all(jobs).await;

    assert!(results.iter().all(ConversionResult::is_success));
    assert!(stats.peak_concurrency() <= 2);

    let status = pipeline.status().await.unwrap();
    assert_eq!(status.slots, 2);
    assert_eq!(status.busy, 0);
    assert_eq!(status.queued, 0);
    assert_eq!(status.total_processed, 8);
}

#[tokio::test]
async fn test_orchestrated_batch_completes() {
    let engine = MockGeneralEngine::new().with_delay(Duration::from_millis(10));
    let stats = engine.stats();
    let magick = Arc::new(MagickPipeline::new(
        MagickConfig::default().with_max_workers(3),
        move || Ok(engine.clone()),
    ));
    let orchestrator = ConversionOrchestrator::new(
        OrchestratorConfig::default(),
        magick.clone(),
        magick,
    );

    let jobs = (0..12).map(|n| {
        orchestrator.convert(
            fixtures::png_file(&format!("img-{n}.png"), 300, 200),
            ImageFormat::Webp,
            0.8,
            true,
        )
    });
    let results = futures::future::join_all(jobs).await;

    assert!(results.iter().all(Result::is_ok));
    assert!(stats.peak_concurrency() <= 3);
}
