//! Configuration validation.

use super::{types::Config, ConfigError};

/// Rejects configurations that would misbehave at runtime.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let storage = &config.storage;
    let roots = [
        ("storage.uploads_dir", &storage.uploads_dir),
        ("storage.segments_dir", &storage.segments_dir),
        ("storage.downloads_dir", &storage.downloads_dir),
    ];

    for (i, (name_a, a)) in roots.iter().enumerate() {
        for (name_b, b) in roots.iter().skip(i + 1) {
            if a == b {
                return Err(ConfigError::Invalid(format!(
                    "{name_a} and {name_b} must not share a directory: {}",
                    a.display()
                )));
            }
            if a.starts_with(b) || b.starts_with(a) {
                return Err(ConfigError::Invalid(format!(
                    "{name_a} and {name_b} must not nest: {} vs {}",
                    a.display(),
                    b.display()
                )));
            }
        }
    }

    if config.segmenter.segment_secs == 0 {
        return Err(ConfigError::Invalid(
            "segmenter.segment_secs must be greater than zero".to_string(),
        ));
    }

    if config.fetcher.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "fetcher.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.orchestrator.max_concurrent_jobs == 0 {
        return Err(ConfigError::Invalid(
            "orchestrator.max_concurrent_jobs must be at least 1".to_string(),
        ));
    }

    if config.orchestrator.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "orchestrator.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_shared_roots_rejected() {
        let mut config = Config::default();
        config.storage.segments_dir = config.storage.uploads_dir.clone();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_nested_roots_rejected() {
        let mut config = Config::default();
        config.storage.uploads_dir = PathBuf::from("/data");
        config.storage.segments_dir = PathBuf::from("/data/segments");
        config.storage.downloads_dir = PathBuf::from("/downloads");
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_segment_duration_rejected() {
        let mut config = Config::default();
        config.segmenter.segment_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.fetcher.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_worker_pool_rejected() {
        let mut config = Config::default();
        config.orchestrator.max_concurrent_jobs = 0;
        assert!(validate_config(&config).is_err());
    }
}
