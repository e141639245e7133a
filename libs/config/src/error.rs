//! Configuration errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// Configuration parsed but violates a constraint
    #[error("Invalid configuration field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
