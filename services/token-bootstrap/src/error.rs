//! Service-specific error types

use thiserror::Error;

/// Failures of the CLI itself. Pipeline failures surface as `nso_auth::Error`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("interrupted")]
    Interrupted,

    #[error("standard input closed")]
    InputClosed,
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
