//! Conversion pipelines.
//!
//! A pipeline binds a worker pool, its job queue and dispatch loop to one
//! conversion strategy:
//!
//! - [`PreviewPipeline`]: pulls the embedded preview out of camera RAW files
//!   and re-encodes it, rejecting previews below a minimum resolution
//! - [`MagickPipeline`]: full decode, orientation, resize and re-encode over
//!   the general engine's format matrix
//!
//! Both implement [`Pipeline`], which is all the orchestrator sees.

mod config;
mod error;
mod magick;
mod preview;
mod traits;
mod types;

pub use config::{MagickConfig, PreviewConfig};
pub use error::{ConversionError, ErrorKind};
pub use magick::{MagickPipeline, MagickRequest, MagickWorker, MAGICK_PIPELINE};
pub use preview::{PreviewPipeline, PreviewWorker, PREVIEW_PIPELINE};
pub use traits::Pipeline;
pub use types::{ConversionResult, PartialConversion, PipelineJob};
