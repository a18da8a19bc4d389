//! Error types for notifyfwd

use thiserror::Error;

/// Main error type for notifyfwd operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias using notifyfwd's Error
pub type Result<T> = std::result::Result<T, Error>;
