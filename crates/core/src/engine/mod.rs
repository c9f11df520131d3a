//! Codec engine boundary.
//!
//! This module defines what the orchestration layer expects from a codec
//! engine and ships concrete engines for it.
//!
//! # Engines
//!
//! - [`PreviewEngine`]: fast extractor returning the embedded preview of a
//!   camera RAW file ([`EmbeddedPreviewEngine`])
//! - [`GeneralEngine`]: full decode, orientation, resize and re-encode over a
//!   broad format matrix ([`ImageEngine`])
//! - [`RasterCodec`]: local re-encode step used after preview extraction
//!   ([`ImageRasterCodec`])
//!
//! # Example
//!
//! ```ignore
//! use rawshift_core::engine::{GeneralEngine, ImageEngine, ImageFormat, ImageGuard};
//!
//! let mut engine = ImageEngine::new();
//! let mut image = ImageGuard::new(engine.decode(&bytes, Some(ImageFormat::Png))?);
//! image.auto_orient()?;
//! image.set_quality(0.9);
//! let jpeg = image.encode(ImageFormat::Jpeg)?;
//! ```

mod embedded_preview;
mod error;
mod format;
mod guard;
mod image_engine;
mod traits;
mod types;

pub use embedded_preview::{find_largest_preview, EmbeddedPreviewEngine};
pub use error::EngineError;
pub use format::{ImageFormat, RawFormat, UnknownFormat};
pub use guard::ImageGuard;
pub use image_engine::{ImageEngine, ImageRasterCodec};
pub use traits::{EngineImage, GeneralEngine, PreviewEngine, RasterCodec};
pub use types::{EncodedImage, InputFile};
