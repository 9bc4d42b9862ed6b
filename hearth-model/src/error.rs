//! Error types for the model layer.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while building model values.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Descriptor configuration could not be parsed.
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] toml::de::Error),

    /// A loosely-shaped filter could not be turned into a [`crate::Filter`].
    #[error("invalid filter on {column}: {reason}")]
    InvalidFilter { column: String, reason: String },

    /// Unknown join kind.
    #[error("unsupported join type: {0}")]
    UnsupportedJoin(String),
}
