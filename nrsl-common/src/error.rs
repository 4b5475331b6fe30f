//! Error types for the sidelink MAC workspace

use thiserror::Error;

/// Error types shared by the sidelink crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected by validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Result type for shared operations
pub type Result<T> = std::result::Result<T, Error>;
