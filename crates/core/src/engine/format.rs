//! Image format identifiers and the capability matrix built on them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Proprietary camera RAW formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawFormat {
    /// Canon RAW 2
    Cr2,
    /// Canon RAW 3 (ISO-BMFF based)
    Cr3,
    /// Canon RAW (CIFF)
    Crw,
    /// Adobe Digital Negative
    Dng,
    /// Nikon
    Nef,
    /// Nikon (compact cameras)
    Nrw,
    /// Olympus
    Orf,
    /// Pentax
    Pef,
    /// Fujifilm
    Raf,
    /// Panasonic / Leica (legacy)
    Raw,
    /// Panasonic
    Rw2,
    /// Samsung
    Srw,
    /// Sony
    Arw,
}

impl RawFormat {
    /// All known RAW formats.
    pub const ALL: [RawFormat; 13] = [
        Self::Cr2,
        Self::Cr3,
        Self::Crw,
        Self::Dng,
        Self::Nef,
        Self::Nrw,
        Self::Orf,
        Self::Pef,
        Self::Raf,
        Self::Raw,
        Self::Rw2,
        Self::Srw,
        Self::Arw,
    ];

    /// Returns the lowercase file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Cr2 => "cr2",
            Self::Cr3 => "cr3",
            Self::Crw => "crw",
            Self::Dng => "dng",
            Self::Nef => "nef",
            Self::Nrw => "nrw",
            Self::Orf => "orf",
            Self::Pef => "pef",
            Self::Raf => "raf",
            Self::Raw => "raw",
            Self::Rw2 => "rw2",
            Self::Srw => "srw",
            Self::Arw => "arw",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

/// An image format a file can be read from or written to.
///
/// Parsed case-insensitively from either an extension or a format
/// identifier, so `"JPG"`, `"jpeg"` and `"Jpeg"` all map to [`ImageFormat::Jpeg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
    Bmp,
    Tiff,
    Ico,
    Tga,
    Qoi,
    /// Vector container; only reachable through a raster substitute.
    Svg,
    Heic,
    Raw(RawFormat),
}

impl ImageFormat {
    /// Maps a file extension or format identifier to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        let format = match ext.as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            "avif" => Self::Avif,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            "ico" => Self::Ico,
            "tga" => Self::Tga,
            "qoi" => Self::Qoi,
            "svg" => Self::Svg,
            "heic" | "heif" => Self::Heic,
            other => return RawFormat::from_extension(other).map(Self::Raw),
        };
        Some(format)
    }

    /// Returns the canonical lowercase extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Ico => "ico",
            Self::Tga => "tga",
            Self::Qoi => "qoi",
            Self::Svg => "svg",
            Self::Heic => "heic",
            Self::Raw(raw) => raw.extension(),
        }
    }

    /// Returns the MIME type for formats a browser can display.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Self::Jpeg => Some("image/jpeg"),
            Self::Png => Some("image/png"),
            Self::Gif => Some("image/gif"),
            Self::Webp => Some("image/webp"),
            Self::Avif => Some("image/avif"),
            _ => None,
        }
    }

    /// Whether this is a proprietary camera RAW format.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Whether the format can be displayed (and therefore re-encoded from a
    /// preview) without the general engine.
    pub fn is_browser_renderable(&self) -> bool {
        self.mime_type().is_some()
    }

    /// Maximum output dimensions, for formats that cap them.
    pub fn max_dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Ico => Some((256, 256)),
            _ => None,
        }
    }

    /// The raster format produced in place of one the general engine cannot
    /// write directly.
    pub fn substitute(&self) -> Option<ImageFormat> {
        match self {
            Self::Svg => Some(Self::Png),
            _ => None,
        }
    }

    /// Whether the general engine accepts this format as input.
    ///
    /// HEIC has no decoder in the general engine, so it is rejected up front
    /// instead of failing inside a worker.
    pub fn is_general_readable(&self) -> bool {
        !matches!(self, Self::Svg | Self::Heic)
    }

    /// Whether the general engine can write this format in a single step.
    pub fn is_general_writable(&self) -> bool {
        matches!(
            self,
            Self::Jpeg
                | Self::Png
                | Self::Gif
                | Self::Webp
                | Self::Avif
                | Self::Bmp
                | Self::Tiff
                | Self::Ico
                | Self::Tga
                | Self::Qoi
        )
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Error returned when parsing an unknown format identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown image format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for ImageFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

impl TryFrom<String> for ImageFormat {
    type Error = UnknownFormat;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageFormat> for String {
    fn from(format: ImageFormat) -> Self {
        format.extension().to_string()
    }
}
