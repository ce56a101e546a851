//! Error types for imagebox.

use thiserror::Error;

/// Common error type for imagebox startup and plumbing.
///
/// The core pipeline has its own error enums in [`crate::store`]; this type
/// covers everything around them (configuration, logging setup, I/O during
/// startup).
#[derive(Error, Debug)]
pub enum ImageboxError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for imagebox operations.
pub type Result<T> = std::result::Result<T, ImageboxError>;
