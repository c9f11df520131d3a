//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the conversion orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Try the preview pipeline first when it accepts the job.
    /// When disabled the general pipeline goes first and the preview
    /// pipeline is only used to rescue a general failure.
    #[serde(default = "default_use_fast_path")]
    pub use_fast_path: bool,

    /// Maximum staging hops through substitute formats per job.
    #[serde(default = "default_max_staging_hops")]
    pub max_staging_hops: u32,

    /// Capacity of each job's update and progress channels.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_use_fast_path() -> bool {
    true
}

fn default_max_staging_hops() -> u32 {
    2
}

fn default_event_buffer() -> usize {
    16
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            use_fast_path: default_use_fast_path(),
            max_staging_hops: default_max_staging_hops(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl OrchestratorConfig {
    /// Set whether the preview pipeline goes first.
    pub fn with_fast_path(mut self, enabled: bool) -> Self {
        self.use_fast_path = enabled;
        self
    }

    /// Set the staging hop limit.
    pub fn with_max_staging_hops(mut self, hops: u32) -> Self {
        self.max_staging_hops = hops;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.use_fast_path);
        assert_eq!(config.max_staging_hops, 2);
        assert_eq!(config.event_buffer, 16);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            use_fast_path = false
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert!(!config.use_fast_path);
        assert_eq!(config.max_staging_hops, 2);
    }
}
