//! Transaction-scoped record operations.

use futures::future::BoxFuture;
use hearth_db::{Connection, ConnectionPool, Row};
use hearth_model::{Record, ValidationMode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::{RecordEngine, annotate};
use crate::error::{EngineError, EngineResult};
use crate::options::DeleteMode;
use crate::planner::{Planner, id_text, returned_key};

/// A write made inside a transaction, reported to observers after commit.
enum Change {
    Created(Record),
    Updated(Record, Record),
    Deleted(Record, DeleteMode),
}

/// CRUD on one borrowed connection inside an open transaction.
///
/// Obtained through [`RecordEngine::transaction`]. Statements are never
/// retried and never touch the cache.
pub struct Transaction<'e, C: Connection> {
    planner: Planner<'e>,
    conn: C,
    changes: Vec<Change>,
}

impl<'e, C: Connection> Transaction<'e, C> {
    async fn run(&self, sql: &str, params: &[Value]) -> EngineResult<Vec<Row>> {
        self.conn
            .execute(sql, params)
            .await
            .map_err(|e| EngineError::Store(annotate(e, sql, params)))
    }

    fn not_found(&self, id: &Value) -> EngineError {
        EngineError::not_found(self.planner.table(), id_text(id))
    }

    async fn read(&self, id: &Value, include_soft_deleted: bool) -> EngineResult<Option<Record>> {
        let (sql, params) = self.planner.select_by_id(id, include_soft_deleted)?;
        let row = self.run(&sql, &params).await?.into_iter().next();
        Ok(row.map(|row| self.planner.decode(row)))
    }

    /// Reads a record, seeing this transaction's own writes.
    pub async fn find_by_id(
        &self,
        id: impl Into<Value>,
        include_soft_deleted: bool,
    ) -> EngineResult<Option<Record>> {
        self.read(&id.into(), include_soft_deleted).await
    }

    pub async fn create(&mut self, data: Record) -> EngineResult<Record> {
        self.planner.validate(&data, ValidationMode::Create)?;
        let prepared = self.planner.prepare_insert(data);
        let (sql, params) = self.planner.insert(&prepared)?;
        let rows = self.run(&sql, &params).await?;

        let key = self.planner.primary_key();
        let id = returned_key(&rows, key)
            .or_else(|| prepared.get(key).cloned())
            .unwrap_or(Value::Null);
        let record = self
            .read(&id, true)
            .await?
            .ok_or_else(|| self.not_found(&id))?;

        self.changes.push(Change::Created(record.clone()));
        Ok(record)
    }

    pub async fn update(&mut self, id: impl Into<Value>, data: Record) -> EngineResult<Record> {
        let id = id.into();
        let before = self
            .read(&id, false)
            .await?
            .ok_or_else(|| self.not_found(&id))?;

        self.planner.validate(&data, ValidationMode::Update)?;
        let changes = self.planner.prepare_update(data);
        if changes.is_empty() {
            return Ok(before);
        }
        let (sql, params) = self.planner.update_by_id(&id, &changes, false)?;
        self.run(&sql, &params).await?;

        let after = self
            .read(&id, true)
            .await?
            .ok_or_else(|| self.not_found(&id))?;
        self.changes.push(Change::Updated(before, after.clone()));
        Ok(after)
    }

    pub async fn delete(&mut self, id: impl Into<Value>, mode: DeleteMode) -> EngineResult<Record> {
        let id = id.into();
        let mode = if self.planner.descriptor.soft_delete {
            mode
        } else {
            DeleteMode::Hard
        };
        let record = self
            .read(&id, mode == DeleteMode::Hard)
            .await?
            .ok_or_else(|| self.not_found(&id))?;

        let (sql, params) = match mode {
            DeleteMode::Soft => self.planner.soft_delete(&id)?,
            DeleteMode::Hard => self.planner.hard_delete(&id)?,
        };
        self.run(&sql, &params).await?;

        self.changes.push(Change::Deleted(record.clone(), mode));
        Ok(record)
    }
}

impl<P: ConnectionPool> RecordEngine<P> {
    /// Runs `callback` inside a transaction on one pooled connection.
    ///
    /// Commits when the callback returns `Ok`; rolls back and returns the
    /// error when it returns `Err` or the commit fails. The connection goes
    /// back to the pool on every path. Cache entries of the entity are
    /// invalidated and observers notified only after a successful commit.
    ///
    /// ```no_run
    /// # use hearth_db::SqlitePool;
    /// # use hearth_engine::{EngineResult, RecordEngine};
    /// # use serde_json::json;
    /// # async fn demo(engine: RecordEngine<SqlitePool>) -> EngineResult<()> {
    /// let created = engine
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             let mut donor = serde_json::Map::new();
    ///             donor.insert("name".into(), json!("Amina"));
    ///             tx.create(donor).await
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = created;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn transaction<'e, R, F>(&'e self, callback: F) -> EngineResult<R>
    where
        R: Send,
        F: for<'t> FnOnce(&'t mut Transaction<'e, P::Connection>) -> BoxFuture<'t, EngineResult<R>>
            + Send,
    {
        let conn = self.pool().acquire_connection().await?;
        conn.begin_transaction().await?;

        let mut tx = Transaction {
            planner: self.planner(),
            conn,
            changes: Vec::new(),
        };

        let outcome = callback(&mut tx).await;
        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                warn!(table = %self.descriptor().table, "rolling back transaction: {err}");
                if let Err(rollback) = tx.conn.rollback().await {
                    warn!(table = %self.descriptor().table, "rollback failed: {rollback}");
                }
                return Err(err);
            }
        };

        if let Err(err) = tx.conn.commit().await {
            warn!(table = %self.descriptor().table, "commit failed, rolling back: {err}");
            if let Err(rollback) = tx.conn.rollback().await {
                warn!(table = %self.descriptor().table, "rollback failed: {rollback}");
            }
            return Err(err.into());
        }

        let Transaction { conn, changes, .. } = tx;
        drop(conn);

        if !changes.is_empty() {
            self.invalidate_cache();
        }
        debug!(table = %self.descriptor().table, writes = changes.len(), "transaction committed");
        for change in &changes {
            for observer in self.observers() {
                match change {
                    Change::Created(record) => observer.after_create(record),
                    Change::Updated(before, after) => observer.after_update(before, after),
                    Change::Deleted(record, mode) => observer.after_delete(record, *mode),
                }
            }
        }
        Ok(value)
    }
}
