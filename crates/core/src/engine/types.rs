//! Value types shared across the engine boundary.

use bytes::Bytes;
use std::fmt;
use std::path::Path;

use super::format::ImageFormat;

/// A named, byte-bearing input file.
///
/// The name drives source-format detection and output naming; the bytes are
/// shared cheaply between the coordinator and worker threads.
#[derive(Clone, PartialEq, Eq)]
pub struct InputFile {
    name: String,
    bytes: Bytes,
}

impl InputFile {
    /// Creates a file from a name and its contents.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a file from disk, naming it after the path's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self::new(name, bytes))
    }

    /// The file name, including extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file contents.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file has no contents.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase extension (text after the last dot), if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// The name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// Source format derived from the extension.
    pub fn format(&self) -> Option<ImageFormat> {
        self.extension()
            .and_then(|ext| ImageFormat::from_extension(&ext))
    }

    /// Output file name for this input converted to `format`.
    pub fn output_name(&self, format: ImageFormat) -> String {
        format!("{}.{}", self.stem(), format.extension())
    }
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Encoded output of a codec step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes.
    pub bytes: Bytes,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Format the bytes are encoded in.
    pub format: ImageFormat,
}
