//! Error types for the record engine.

use hearth_db::StoreError;
use hearth_model::ModelError;
use hearth_query::QueryError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by [`crate::RecordEngine`] and [`crate::Transaction`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The payload broke one or more schema rules. Nothing was written.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The target record does not exist (or is soft-deleted and hidden).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation needs a capability the entity has disabled.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed structural input (filters, joins, identifiers, relations).
    #[error("query error: {0}")]
    Query(String),

    /// Column metadata could not be introspected.
    #[error("schema unavailable for {0}")]
    SchemaUnavailable(String),

    /// Failure reported by the store, annotated with the failing statement.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Violation messages of a validation failure; empty for other errors.
    pub fn violations(&self) -> &[String] {
        match self {
            Self::Validation(messages) => messages,
            _ => &[],
        }
    }
}

impl From<QueryError> for EngineError {
    fn from(err: QueryError) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Descriptor(_) => Self::Config(err.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}
