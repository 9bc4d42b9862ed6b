use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;

/// A result row: column name to value.
pub type Row = serde_json::Map<String, Value>;

/// Runs one parameterized statement.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes `sql` with positional `params`.
    ///
    /// Statements that produce a result set (SELECT, or anything with
    /// `RETURNING`) return their rows; other statements return no rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>>;
}

/// An exclusive connection borrowed from a pool.
///
/// Dropping the connection releases it back to its pool.
#[async_trait]
pub trait Connection: Executor {
    async fn begin_transaction(&self) -> StoreResult<()>;

    async fn commit(&self) -> StoreResult<()>;

    async fn rollback(&self) -> StoreResult<()>;
}

/// A bounded set of connections. Executing on the pool itself borrows a
/// connection for the single statement.
#[async_trait]
pub trait ConnectionPool: Executor {
    type Connection: Connection + 'static;

    /// Waits for a free connection.
    async fn acquire_connection(&self) -> StoreResult<Self::Connection>;
}
