//! Synthetic encoded images for tests.
//!
//! Mock engines exchange images as `MOCK:{width}x{height}` byte strings,
//! optionally followed by `:{extension}`, so tests can run real pools and
//! pipelines without encoding large pixel buffers.

use bytes::Bytes;

use crate::engine::{EncodedImage, EngineError, ImageFormat, RasterCodec};

const PREFIX: &str = "MOCK:";

/// Bytes of a mock image with the given dimensions.
pub fn mock_image_bytes(width: u32, height: u32) -> Bytes {
    Bytes::from(format!("{PREFIX}{width}x{height}"))
}

/// Bytes of a mock image tagged with its encoded format.
pub fn mock_encoded_bytes(width: u32, height: u32, format: ImageFormat) -> Bytes {
    Bytes::from(format!("{PREFIX}{width}x{height}:{}", format.extension()))
}

/// Reads the dimensions of a mock image.
pub fn parse_mock_image(bytes: &[u8]) -> Option<(u32, u32)> {
    let text = std::str::from_utf8(bytes).ok()?.strip_prefix(PREFIX)?;
    let dims = text.split(':').next()?;
    let (width, height) = dims.split_once('x')?;
    Some((width.parse().ok()?, height.parse().ok()?))
}

/// [`RasterCodec`] over mock images.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockRasterCodec;

impl RasterCodec for MockRasterCodec {
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), EngineError> {
        parse_mock_image(bytes).ok_or_else(|| EngineError::decode("not a mock image"))
    }

    fn encode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        _quality: f32,
    ) -> Result<EncodedImage, EngineError> {
        let (width, height) = self.dimensions(bytes)?;
        Ok(EncodedImage {
            bytes: mock_encoded_bytes(width, height, format),
            width,
            height,
            format,
        })
    }
}
