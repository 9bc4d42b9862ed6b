//! Error types for SQL generation.

use hearth_model::ModelError;
use thiserror::Error;

/// Result type for builder operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Malformed structural input to a builder.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Not a plain (optionally table-qualified) identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("raw condition on {0} is empty")]
    EmptyRaw(String),

    #[error("malformed join on {table}: {reason}")]
    MalformedJoin { table: String, reason: String },

    #[error("nothing to {0}")]
    EmptyStatement(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),
}
