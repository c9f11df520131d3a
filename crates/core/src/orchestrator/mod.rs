//! Conversion orchestrator.
//!
//! Picks a pipeline per job, applies the fallback policy between the fast
//! (preview) and general (magick) pipelines, and stages conversions whose
//! target can only be reached through an intermediate format.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::ConversionOrchestrator;
pub use types::{ConversionFailure, ConversionOutput, ConversionUpdate, OrchestratorStatus};
