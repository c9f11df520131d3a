//! The pipeline capability interface.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{ImageFormat, InputFile};
use crate::job::JobStatus;
use crate::pool::PoolStatus;

use super::types::{ConversionResult, PipelineJob};

/// A conversion strategy backed by its own worker pool.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Returns the name of this pipeline.
    fn name(&self) -> &str;

    /// Whether this pipeline accepts `file` for conversion to `target`.
    ///
    /// Pure function of the file extension and target format.
    fn can_handle(&self, file: &InputFile, target: ImageFormat) -> bool;

    /// Runs one conversion pass.
    ///
    /// `progress_tx` receives [`JobStatus::Processing`] when a worker picks
    /// the job up. Never returns an error: failures are a
    /// [`ConversionResult::Failure`].
    async fn submit(
        &self,
        job: PipelineJob,
        progress_tx: mpsc::Sender<JobStatus>,
    ) -> ConversionResult;

    /// Starts the first worker ahead of demand.
    fn preload(&self);

    /// Current pool status, if the pool is running.
    async fn status(&self) -> Option<PoolStatus>;
}
