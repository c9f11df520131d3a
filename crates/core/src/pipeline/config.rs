//! Configuration for the conversion pipelines.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::RawFormat;

/// Configuration for the preview (fast extraction) pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Maximum number of preview workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-attempt worker response timeout in milliseconds.
    #[serde(default = "default_preview_timeout")]
    pub response_timeout_ms: u64,

    /// Minimum longest side, in pixels, an embedded preview must have.
    #[serde(default = "default_min_resolution")]
    pub min_resolution: u32,

    /// RAW extensions this pipeline accepts.
    #[serde(default = "default_raw_extensions")]
    pub raw_extensions: Vec<String>,
}

/// Configuration for the magick (general engine) pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagickConfig {
    /// Maximum number of general workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-attempt worker response timeout in milliseconds.
    #[serde(default = "default_magick_timeout")]
    pub response_timeout_ms: u64,
}

fn default_max_workers() -> usize {
    4
}

fn default_preview_timeout() -> u64 {
    1000
}

fn default_magick_timeout() -> u64 {
    30_000
}

fn default_min_resolution() -> u32 {
    3840
}

fn default_raw_extensions() -> Vec<String> {
    RawFormat::ALL
        .iter()
        .map(|f| f.extension().to_string())
        .collect()
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            response_timeout_ms: default_preview_timeout(),
            min_resolution: default_min_resolution(),
            raw_extensions: default_raw_extensions(),
        }
    }
}

impl PreviewConfig {
    /// Set the maximum number of workers.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    /// Set the response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the minimum preview resolution.
    pub fn with_min_resolution(mut self, min: u32) -> Self {
        self.min_resolution = min;
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Whether `ext` is on the RAW allow-list. Case-insensitive.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.raw_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

impl Default for MagickConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            response_timeout_ms: default_magick_timeout(),
        }
    }
}

impl MagickConfig {
    /// Set the maximum number of workers.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    /// Set the response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_defaults() {
        let config = PreviewConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.response_timeout(), Duration::from_secs(1));
        assert_eq!(config.min_resolution, 3840);
        assert_eq!(config.raw_extensions.len(), 13);
        assert!(config.accepts_extension("CR3"));
        assert!(config.accepts_extension("arw"));
        assert!(!config.accepts_extension("jpg"));
    }

    #[test]
    fn test_magick_defaults() {
        let config = MagickConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_builders() {
        let config = PreviewConfig::default()
            .with_max_workers(2)
            .with_response_timeout(Duration::from_millis(250))
            .with_min_resolution(1024);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.response_timeout_ms, 250);
        assert_eq!(config.min_resolution, 1024);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: PreviewConfig = toml::from_str("min_resolution = 2000").unwrap();
        assert_eq!(config.min_resolution, 2000);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.raw_extensions.len(), 13);
    }
}
