//! Error types for the execution boundary.

use std::fmt;

use rusqlite::ErrorCode;
use serde_json::Value;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure classes the record engine handles specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorCode {
    /// Unique or primary-key constraint violated.
    DuplicateKey,
    /// Referenced row missing (foreign-key constraint violated).
    ForeignKey,
    /// The store could not be reached or opened.
    ConnectionRefused,
    Other,
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DuplicateKey => "duplicate_key",
            Self::ForeignKey => "foreign_key",
            Self::ConnectionRefused => "connection_refused",
            Self::Other => "other",
        })
    }
}

/// An opaque failure from the store, annotated with the failing statement.
#[derive(Debug, Clone, Error)]
#[error("store error ({code}): {message}{}", .sql.as_ref().map(|s| format!(" [sql: {s}]")).unwrap_or_default())]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
    pub sql: Option<String>,
    pub params: Vec<Value>,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sql: None,
            params: Vec::new(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Other, message)
    }

    /// Attaches the statement and its parameters for diagnostics.
    pub fn with_statement(mut self, sql: &str, params: &[Value]) -> Self {
        self.sql = Some(sql.to_string());
        self.params = params.to_vec();
        self
    }

    /// Constraint violations will fail the same way again; everything else may
    /// be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.code,
            StoreErrorCode::DuplicateKey | StoreErrorCode::ForeignKey
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::ConstraintViolation => match failure.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => StoreErrorCode::DuplicateKey,
                    rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => StoreErrorCode::ForeignKey,
                    _ => StoreErrorCode::Other,
                },
                ErrorCode::CannotOpen | ErrorCode::NotADatabase => {
                    StoreErrorCode::ConnectionRefused
                }
                _ => StoreErrorCode::Other,
            },
            _ => StoreErrorCode::Other,
        };
        Self::new(code, err.to_string())
    }
}
