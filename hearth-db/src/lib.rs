//! Statement execution boundary for the Hearth record engine.
//!
//! The record engine talks to its store through three small traits:
//! - [`Executor`]: run one parameterized statement, get rows back
//! - [`ConnectionPool`]: hand out exclusive [`Connection`]s
//! - [`Connection`]: an executor with `begin`/`commit`/`rollback`
//!
//! Connections are released by `Drop`, so every exit path of a transaction
//! returns the connection to its pool.
//!
//! [`SqlitePool`] implements the boundary on top of rusqlite. Placeholders are
//! positional `?`; mutations that need ids or counts use `RETURNING`.

mod error;
mod executor;
mod sqlite;
mod value;

pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use executor::{Connection, ConnectionPool, Executor, Row};
pub use sqlite::{SqliteConnection, SqlitePool};
