//! Service configuration: TOML file plus environment overrides.

mod loader;
mod types;
mod validate;

use thiserror::Error;

pub use loader::{load_config, load_config_from_str};
pub use types::{Config, DatabaseConfig, ServerConfig};
pub use validate::validate_config;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file does not exist.
    #[error("config file not found: {0}")]
    FileNotFound(String),

    /// Config file could not be parsed.
    #[error("failed to parse config: {0}")]
    ParseError(String),

    /// Config parsed but holds unusable values.
    #[error("invalid config: {0}")]
    Invalid(String),
}
