use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Worker counts and timeouts are non-zero
/// - At least one RAW extension and one staging hop
/// - Output quality is in [0, 1] and the output format is known
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.preview.max_workers == 0 {
        return fail("preview.max_workers cannot be 0");
    }
    if config.preview.response_timeout_ms == 0 {
        return fail("preview.response_timeout_ms cannot be 0");
    }
    if config.preview.raw_extensions.is_empty() {
        return fail("preview.raw_extensions cannot be empty");
    }
    if config.magick.max_workers == 0 {
        return fail("magick.max_workers cannot be 0");
    }
    if config.magick.response_timeout_ms == 0 {
        return fail("magick.response_timeout_ms cannot be 0");
    }
    if config.orchestrator.max_staging_hops == 0 {
        return fail("orchestrator.max_staging_hops cannot be 0");
    }
    if config.orchestrator.event_buffer == 0 {
        return fail("orchestrator.event_buffer cannot be 0");
    }
    if !(0.0..=1.0).contains(&config.output.quality) {
        return fail("output.quality must be between 0 and 1");
    }
    if let Err(e) = config.output.target_format() {
        return Err(ConfigError::ValidationError(format!("output.format: {e}")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_validate_default_config() {
        assert_ok!(validate_config(&Config::default()));
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.magick.max_workers = 0;
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_quality_out_of_range_fails() {
        let mut config = Config::default();
        config.output.quality = 1.5;
        assert_err!(validate_config(&config));
    }

    #[test]
    fn test_validate_unknown_format_fails() {
        let mut config = Config::default();
        config.output.format = "bogus".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("output.format"));
    }

    #[test]
    fn test_validate_empty_raw_extensions_fails() {
        let mut config = Config::default();
        config.preview.raw_extensions.clear();
        assert!(validate_config(&config).is_err());
    }
}
