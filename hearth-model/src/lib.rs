//! Core data model for the Hearth record engine.
//!
//! Defines the types every other Hearth crate speaks in:
//! - [`EntityDescriptor`]: table name, primary key and per-entity feature flags
//! - [`ColumnSchema`] / [`TableSchema`]: introspected column metadata, validation
//!   and the structured-column codec
//! - [`LogicalType`]: the closed set of column types, each with its own validator
//! - [`Filter`] / [`Filters`]: the fixed predicate vocabulary
//! - [`SortField`], [`Join`], [`PaginationResult`]: query shaping and paged results
//!
//! A [`Record`] is a plain JSON object keyed by column name. Domain entities
//! (users, cases, transactions, committees, ...) are all handled through it.

mod descriptor;
mod error;
mod filter;
mod query;
mod schema;

pub use descriptor::{EntityDescriptor, DEFAULT_MAX_BULK_BATCH_SIZE};
pub use error::{ModelError, ModelResult};
pub use filter::{CompareOp, Filter, Filters};
pub use query::{
    Join, JoinKind, PageInfo, PaginationResult, Progress, SortDirection, SortField,
};
pub use schema::{ColumnSchema, LogicalType, TableSchema, ValidationMode};

/// A record: column name to decoded value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Column stamped when a record is inserted (timestamps enabled).
pub const CREATED_AT: &str = "created_at";

/// Column stamped on every write (timestamps enabled).
pub const UPDATED_AT: &str = "updated_at";

/// Deletion marker column (soft delete enabled).
pub const DELETED_AT: &str = "deleted_at";
