//! Mock codec engines with controllable behavior.

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{EngineError, EngineImage, GeneralEngine, ImageFormat, PreviewEngine};

use super::mock_codec::{mock_encoded_bytes, mock_image_bytes, parse_mock_image};

/// Call counters shared by every clone of a mock engine.
#[derive(Debug, Default)]
pub struct MockStats {
    /// Requests that reached an engine.
    pub calls: AtomicUsize,
    /// Decode attempts, including hint retries.
    pub decodes: AtomicUsize,
    /// Image handles disposed.
    pub disposes: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl MockStats {
    /// Highest number of requests seen in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock fast extractor.
///
/// Every clone shares the same [`MockStats`], so a test can hand clones to
/// an engine factory and still observe all workers.
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockPreviewEngine::with_preview(6000, 4000);
/// let stats = engine.stats();
/// let pipeline = PreviewPipeline::new(config, move || Ok(engine.clone()), codec);
/// ```
#[derive(Debug, Clone)]
pub struct MockPreviewEngine {
    preview: Option<(u32, u32)>,
    delay: Option<Duration>,
    stats: Arc<MockStats>,
}

impl MockPreviewEngine {
    /// Engine that returns a preview of the given size.
    pub fn with_preview(width: u32, height: u32) -> Self {
        Self {
            preview: Some((width, height)),
            delay: None,
            stats: Arc::default(),
        }
    }

    /// Engine that never finds a preview.
    pub fn failing() -> Self {
        Self {
            preview: None,
            delay: None,
            stats: Arc::default(),
        }
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

impl PreviewEngine for MockPreviewEngine {
    fn extract_preview(&mut self, _bytes: &[u8]) -> Result<Bytes, EngineError> {
        self.stats.enter();
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.stats.leave();
        match self.preview {
            Some((width, height)) => Ok(mock_image_bytes(width, height)),
            None => Err(EngineError::NoPreview),
        }
    }
}

/// Mock general engine over `MOCK:{w}x{h}` inputs.
#[derive(Debug, Clone, Default)]
pub struct MockGeneralEngine {
    fail_with_hint: bool,
    fail_decode: bool,
    empty_output: bool,
    delay: Option<Duration>,
    stats: Arc<MockStats>,
}

impl MockGeneralEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoding with a format hint fails; auto-detection succeeds.
    pub fn failing_with_hint(mut self) -> Self {
        self.fail_with_hint = true;
        self
    }

    /// Every decode fails.
    pub fn failing(mut self) -> Self {
        self.fail_decode = true;
        self
    }

    /// Encoding succeeds but yields no bytes.
    pub fn with_empty_output(mut self) -> Self {
        self.empty_output = true;
        self
    }

    /// Sleep this long inside each decode.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

impl GeneralEngine for MockGeneralEngine {
    fn decode(
        &mut self,
        bytes: &[u8],
        hint: Option<ImageFormat>,
    ) -> Result<Box<dyn EngineImage>, EngineError> {
        self.stats.decodes.fetch_add(1, Ordering::SeqCst);
        self.stats.enter();
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.stats.leave();

        if self.fail_decode {
            return Err(EngineError::decode("mock decode failure"));
        }
        if hint.is_some() && self.fail_with_hint {
            return Err(EngineError::decode("format hint does not match content"));
        }
        let (width, height) =
            parse_mock_image(bytes).ok_or_else(|| EngineError::decode("unrecognized input"))?;
        Ok(Box::new(MockImage {
            width,
            height,
            empty_output: self.empty_output,
            disposed: false,
            stats: self.stats.clone(),
        }))
    }
}

struct MockImage {
    width: u32,
    height: u32,
    empty_output: bool,
    disposed: bool,
    stats: Arc<MockStats>,
}

impl EngineImage for MockImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn auto_orient(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<(), EngineError> {
        let scale = f64::min(
            max_width as f64 / self.width as f64,
            max_height as f64 / self.height as f64,
        );
        if scale < 1.0 {
            self.width = ((self.width as f64 * scale).floor() as u32).max(1);
            self.height = ((self.height as f64 * scale).floor() as u32).max(1);
        }
        Ok(())
    }

    fn set_quality(&mut self, _quality: f32) {}

    fn encode(&mut self, format: ImageFormat) -> Result<Bytes, EngineError> {
        if self.empty_output {
            return Ok(Bytes::new());
        }
        Ok(mock_encoded_bytes(self.width, self.height, format))
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.stats.disposes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
