use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::{ImageFormat, UnknownFormat};
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::{MagickConfig, PreviewConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub magick: MagickConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output defaults for the command line
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_output_format")]
    pub format: String,
    #[serde(default = "default_quality")]
    pub quality: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: default_output_format(),
            quality: default_quality(),
        }
    }
}

impl OutputConfig {
    pub fn target_format(&self) -> Result<ImageFormat, UnknownFormat> {
        self.format.parse()
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_format() -> String {
    "jpg".to_string()
}

fn default_quality() -> f32 {
    1.0
}
