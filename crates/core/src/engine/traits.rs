//! Trait definitions for the codec engine boundary.
//!
//! Engines are synchronous and run on dedicated worker threads; the
//! orchestration layer never calls them from the async coordinator.

use bytes::Bytes;

use super::error::EngineError;
use super::format::ImageFormat;
use super::types::EncodedImage;

/// Fast extractor: pulls the embedded preview out of a camera RAW file.
pub trait PreviewEngine: Send + 'static {
    /// Returns the encoded bytes of the largest embedded preview.
    fn extract_preview(&mut self, bytes: &[u8]) -> Result<Bytes, EngineError>;
}

/// General engine: full decode of a broad format matrix.
pub trait GeneralEngine: Send + 'static {
    /// Decodes `bytes`, optionally trusting `hint` as the source format.
    fn decode(
        &mut self,
        bytes: &[u8],
        hint: Option<ImageFormat>,
    ) -> Result<Box<dyn EngineImage>, EngineError>;
}

/// A decoded image owned by a general engine.
///
/// Holders must call [`EngineImage::dispose`] once they are done; wrap the
/// handle in an [`ImageGuard`](super::ImageGuard) to get that on every path.
pub trait EngineImage: Send {
    /// Current width in pixels.
    fn width(&self) -> u32;

    /// Current height in pixels.
    fn height(&self) -> u32;

    /// Applies embedded orientation metadata and resets it.
    fn auto_orient(&mut self) -> Result<(), EngineError>;

    /// Downscales to fit within `max_width` x `max_height`, keeping aspect ratio.
    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<(), EngineError>;

    /// Sets encode quality in [0, 1].
    fn set_quality(&mut self, quality: f32);

    /// Encodes the image in `format`.
    fn encode(&mut self, format: ImageFormat) -> Result<Bytes, EngineError>;

    /// Releases engine resources held by this image.
    fn dispose(&mut self);
}

/// Local, non-pooled raster step used after preview extraction.
pub trait RasterCodec: Send + Sync + 'static {
    /// Reads the dimensions of an encoded raster.
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), EngineError>;

    /// Re-encodes a raster into `format` at `quality` in [0, 1].
    fn encode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        quality: f32,
    ) -> Result<EncodedImage, EngineError>;
}
