//! General engine and local raster codec backed by the `image` crate.

use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

use super::error::EngineError;
use super::format::ImageFormat;
use super::traits::{EngineImage, GeneralEngine, RasterCodec};
use super::types::EncodedImage;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

/// Maps our format to the `image` crate's, for formats it handles.
fn codec_format(format: ImageFormat) -> Option<image::ImageFormat> {
    match format {
        ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
        ImageFormat::Png => Some(image::ImageFormat::Png),
        ImageFormat::Gif => Some(image::ImageFormat::Gif),
        ImageFormat::Webp => Some(image::ImageFormat::WebP),
        ImageFormat::Avif => Some(image::ImageFormat::Avif),
        ImageFormat::Bmp => Some(image::ImageFormat::Bmp),
        ImageFormat::Tiff => Some(image::ImageFormat::Tiff),
        ImageFormat::Ico => Some(image::ImageFormat::Ico),
        ImageFormat::Tga => Some(image::ImageFormat::Tga),
        ImageFormat::Qoi => Some(image::ImageFormat::Qoi),
        ImageFormat::Svg | ImageFormat::Heic | ImageFormat::Raw(_) => None,
    }
}

/// Converts a [0, 1] quality into the 1-100 scale encoders expect.
fn quality_percent(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encodes a decoded image in `format` at `quality`.
fn encode_dynamic(
    image: &DynamicImage,
    format: ImageFormat,
    quality: f32,
) -> Result<Bytes, EngineError> {
    let target = codec_format(format)
        .filter(|_| format.is_general_writable())
        .ok_or_else(|| EngineError::UnsupportedFormat(format.to_string()))?;

    let mut out = Cursor::new(Vec::new());
    let result = match target {
        // JPEG has no alpha channel
        image::ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(
                &mut out,
                quality_percent(quality),
            ))
        }
        image::ImageFormat::Avif => {
            let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
            rgba.write_with_encoder(AvifEncoder::new_with_speed_quality(
                &mut out,
                AVIF_SPEED,
                quality_percent(quality),
            ))
        }
        other => DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut out, other),
    };
    result.map_err(|e| EngineError::encode(e.to_string()))?;

    let bytes = out.into_inner();
    if bytes.is_empty() {
        return Err(EngineError::EmptyOutput);
    }
    Ok(Bytes::from(bytes))
}

/// Reads the EXIF orientation tag (1-8), defaulting to 1.
fn exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    }
}

/// Applies an EXIF orientation value.
fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// General engine built on the `image` crate.
///
/// Proprietary RAW containers are accepted by the capability matrix but
/// only decode when the crate recognizes the container (e.g. TIFF-based DNG).
#[derive(Debug, Default)]
pub struct ImageEngine;

impl ImageEngine {
    pub fn new() -> Self {
        Self
    }
}

impl GeneralEngine for ImageEngine {
    fn decode(
        &mut self,
        bytes: &[u8],
        hint: Option<ImageFormat>,
    ) -> Result<Box<dyn EngineImage>, EngineError> {
        let decoded = match hint {
            Some(format) => {
                let codec = codec_format(format)
                    .ok_or_else(|| EngineError::UnsupportedFormat(format.to_string()))?;
                image::load_from_memory_with_format(bytes, codec)
            }
            None => image::load_from_memory(bytes),
        }
        .map_err(|e| EngineError::decode(e.to_string()))?;

        Ok(Box::new(ImageHandle {
            image: Some(decoded),
            orientation: exif_orientation(bytes),
            quality: 1.0,
        }))
    }
}

/// Decoded image held by [`ImageEngine`].
struct ImageHandle {
    image: Option<DynamicImage>,
    orientation: u32,
    quality: f32,
}

impl ImageHandle {
    fn image(&self) -> Result<&DynamicImage, EngineError> {
        self.image
            .as_ref()
            .ok_or_else(|| EngineError::encode("image already disposed"))
    }

    fn take(&mut self) -> Result<DynamicImage, EngineError> {
        self.image
            .take()
            .ok_or_else(|| EngineError::encode("image already disposed"))
    }
}

impl EngineImage for ImageHandle {
    fn width(&self) -> u32 {
        self.image.as_ref().map(|i| i.width()).unwrap_or(0)
    }

    fn height(&self) -> u32 {
        self.image.as_ref().map(|i| i.height()).unwrap_or(0)
    }

    fn auto_orient(&mut self) -> Result<(), EngineError> {
        let image = self.take()?;
        self.image = Some(apply_orientation(image, self.orientation));
        self.orientation = 1;
        Ok(())
    }

    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<(), EngineError> {
        if max_width == 0 || max_height == 0 {
            return Err(EngineError::encode("resize bounds must be non-zero"));
        }
        let image = self.take()?;
        if image.width() <= max_width && image.height() <= max_height {
            self.image = Some(image);
            return Ok(());
        }
        self.image = Some(image.resize(max_width, max_height, FilterType::Lanczos3));
        Ok(())
    }

    fn set_quality(&mut self, quality: f32) {
        self.quality = quality.clamp(0.0, 1.0);
    }

    fn encode(&mut self, format: ImageFormat) -> Result<Bytes, EngineError> {
        encode_dynamic(self.image()?, format, self.quality)
    }

    fn dispose(&mut self) {
        self.image = None;
    }
}

/// Local raster codec built on the `image` crate.
#[derive(Debug, Default, Clone)]
pub struct ImageRasterCodec;

impl ImageRasterCodec {
    pub fn new() -> Self {
        Self
    }
}

impl RasterCodec for ImageRasterCodec {
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32), EngineError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| EngineError::decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| EngineError::decode(e.to_string()))
    }

    fn encode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        quality: f32,
    ) -> Result<EncodedImage, EngineError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| EngineError::decode(e.to_string()))?;
        let decoded = apply_orientation(decoded, exif_orientation(bytes));
        let encoded = encode_dynamic(&decoded, format, quality)?;
        Ok(EncodedImage {
            bytes: encoded,
            width: decoded.width(),
            height: decoded.height(),
            format,
        })
    }
}
