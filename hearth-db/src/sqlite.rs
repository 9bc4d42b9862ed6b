//! SQLite implementation of the execution boundary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreErrorCode, StoreResult};
use crate::executor::{Connection, ConnectionPool, Executor, Row};
use crate::value;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Slot = Arc<Mutex<rusqlite::Connection>>;

enum Target {
    File(PathBuf),
    /// Private in-memory database (single connection).
    Memory,
    /// Named `memdb` database, for pools of more than one. Uses file-style
    /// locking, so a busy connection waits out `BUSY_TIMEOUT`.
    SharedMemory(String),
}

struct PoolInner {
    target: Target,
    idle: Mutex<Vec<Slot>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl PoolInner {
    fn take_idle(&self) -> StoreResult<Slot> {
        let slot = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match slot {
            Some(slot) => Ok(slot),
            None => {
                warn!("connection slot missing from pool, reopening");
                Ok(Arc::new(Mutex::new(open_connection(&self.target)?)))
            }
        }
    }

    fn give_back(&self, slot: Slot) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(slot);
    }
}

fn open_connection(target: &Target) -> StoreResult<rusqlite::Connection> {
    let conn = match target {
        Target::File(path) => {
            let conn = rusqlite::Connection::open(path)?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
            conn
        }
        Target::Memory => rusqlite::Connection::open_in_memory()?,
        Target::SharedMemory(uri) => rusqlite::Connection::open(uri)?,
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Runs one statement on a locked connection.
fn run(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let bound = rusqlite::params_from_iter(params.iter().map(value::to_sql));

    if stmt.column_count() == 0 {
        stmt.execute(bound)?;
        return Ok(Vec::new());
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(bound)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), value::from_sql(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

async fn run_on(slot: &Slot, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
    debug!(sql = %sql, params = params.len(), "executing statement");

    let slot = slot.clone();
    let owned_sql = sql.to_string();
    let owned_params = params.to_vec();
    let joined = tokio::task::spawn_blocking(move || {
        let conn = slot.lock().unwrap_or_else(PoisonError::into_inner);
        run(&conn, &owned_sql, &owned_params)
    })
    .await;

    match joined {
        Ok(Ok(rows)) => Ok(rows),
        Ok(Err(e)) => Err(StoreError::from(e).with_statement(sql, params)),
        Err(e) => Err(StoreError::other(format!("statement task failed: {e}"))
            .with_statement(sql, params)),
    }
}

/// A bounded pool of SQLite connections.
///
/// Blocking SQLite calls run on tokio's blocking thread pool.
#[derive(Clone)]
pub struct SqlitePool {
    inner: Arc<PoolInner>,
}

impl SqlitePool {
    /// Opens (or creates) a database file with `size` connections in WAL mode.
    pub fn open(path: impl AsRef<Path>, size: usize) -> StoreResult<Self> {
        Self::build(Target::File(path.as_ref().to_path_buf()), size)
    }

    /// Opens a private in-memory database with a single connection.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::build(Target::Memory, 1)
    }

    /// Opens an in-memory database shared by `size` connections.
    pub fn open_in_memory_with_size(size: usize) -> StoreResult<Self> {
        if size <= 1 {
            return Self::open_in_memory();
        }
        let uri = format!("file:/hearth-{}?vfs=memdb", uuid::Uuid::new_v4());
        Self::build(Target::SharedMemory(uri), size)
    }

    fn build(target: Target, size: usize) -> StoreResult<Self> {
        let size = size.max(1);
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(Arc::new(Mutex::new(open_connection(&target)?)));
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                target,
                idle: Mutex::new(idle),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        })
    }

    /// Maximum number of connections handed out at once.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Connections currently sitting in the pool.
    pub fn idle_connections(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs a semicolon-separated script (table setup, migrations) on one
    /// connection.
    pub async fn execute_batch(&self, script: &str) -> StoreResult<()> {
        let conn = self.acquire_connection().await?;
        let slot = conn.slot()?.clone();
        let owned = script.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = slot.lock().unwrap_or_else(PoisonError::into_inner);
            conn.execute_batch(&owned)
        })
        .await
        .map_err(|e| StoreError::other(format!("script task failed: {e}")))?
        .map_err(StoreError::from)
    }
}

#[async_trait]
impl Executor for SqlitePool {
    async fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        let conn = self.acquire_connection().await?;
        conn.execute(sql, params).await
    }
}

#[async_trait]
impl ConnectionPool for SqlitePool {
    type Connection = SqliteConnection;

    async fn acquire_connection(&self) -> StoreResult<SqliteConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::new(StoreErrorCode::ConnectionRefused, "pool closed"))?;
        let slot = self.inner.take_idle()?;
        Ok(SqliteConnection {
            slot: Some(slot),
            pool: self.inner.clone(),
            in_transaction: AtomicBool::new(false),
            permit: Some(permit),
        })
    }
}

/// A connection borrowed from a [`SqlitePool`]; returned to it on drop.
///
/// A transaction still open at drop time is rolled back first.
pub struct SqliteConnection {
    slot: Option<Slot>,
    pool: Arc<PoolInner>,
    in_transaction: AtomicBool,
    /// Held until the slot is back in the pool.
    permit: Option<OwnedSemaphorePermit>,
}

impl SqliteConnection {
    fn slot(&self) -> StoreResult<&Slot> {
        self.slot
            .as_ref()
            .ok_or_else(|| StoreError::other("connection already released"))
    }

    /// Whether `begin_transaction` succeeded without a matching commit or
    /// rollback.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Executor for SqliteConnection {
    async fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        run_on(self.slot()?, sql, params).await
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn begin_transaction(&self) -> StoreResult<()> {
        run_on(self.slot()?, "BEGIN IMMEDIATE", &[]).await?;
        self.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    async fn commit(&self) -> StoreResult<()> {
        run_on(self.slot()?, "COMMIT", &[]).await?;
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    async fn rollback(&self) -> StoreResult<()> {
        run_on(self.slot()?, "ROLLBACK", &[]).await?;
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let permit = self.permit.take();
        if !self.in_transaction.load(Ordering::Acquire) {
            self.pool.give_back(slot);
            return;
        }

        warn!("connection released with an open transaction, rolling back");
        let pool = self.pool.clone();
        let release = move || {
            {
                let conn = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    warn!("rollback on release failed: {e}");
                }
            }
            pool.give_back(slot);
            drop(permit);
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(release);
            }
            Err(_) => release(),
        }
    }
}
