//! Scripted pipeline for orchestrator tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::engine::{ImageFormat, InputFile};
use crate::job::JobStatus;
use crate::pipeline::{ConversionError, ConversionResult, Pipeline, PipelineJob};
use crate::pool::PoolStatus;

/// A pass recorded by [`MockPipeline`].
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub file_name: String,
    pub target: ImageFormat,
    pub quality: f32,
}

/// Pipeline that replays scripted results without any workers.
///
/// Accepts files whose extension is in `extensions` (all files when empty).
/// Results are returned in the order they were pushed; once the script runs
/// out every pass fails with [`ConversionError::Unknown`].
#[derive(Clone)]
pub struct MockPipeline {
    name: String,
    extensions: Vec<String>,
    script: Arc<Mutex<VecDeque<ConversionResult>>>,
    passes: Arc<Mutex<Vec<RecordedPass>>>,
}

impl MockPipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            script: Arc::default(),
            passes: Arc::default(),
        }
    }

    /// Only accept files with these extensions.
    pub fn accepting(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    /// Queue the result of the next unscripted pass.
    pub fn push_result(&self, result: ConversionResult) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    /// Passes submitted so far.
    pub fn passes(&self) -> Vec<RecordedPass> {
        self.passes
            .lock()
            .map(|passes| passes.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Pipeline for MockPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, file: &InputFile, _target: ImageFormat) -> bool {
        self.extensions.is_empty()
            || file
                .extension()
                .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    async fn submit(
        &self,
        job: PipelineJob,
        progress_tx: mpsc::Sender<JobStatus>,
    ) -> ConversionResult {
        if let Ok(mut passes) = self.passes.lock() {
            passes.push(RecordedPass {
                file_name: job.file.name().to_string(),
                target: job.target,
                quality: job.quality,
            });
        }
        let _ = progress_tx.try_send(JobStatus::Processing);
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| {
                ConversionResult::Failure(ConversionError::Unknown("script exhausted".into()))
            })
    }

    fn preload(&self) {}

    async fn status(&self) -> Option<PoolStatus> {
        None
    }
}
