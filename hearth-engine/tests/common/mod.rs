//! Shared test helpers for record engine tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hearth_db::{
    ConnectionPool, Executor, Row, SqliteConnection, SqlitePool, StoreError, StoreErrorCode,
    StoreResult,
};
use hearth_engine::{DeleteMode, RecordEngine, RecordObserver};
use hearth_model::{EntityDescriptor, Record};
use serde_json::{Value, json};

pub const SCHEMA: &str = "
    CREATE TABLE donors (
        id TEXT PRIMARY KEY,
        name VARCHAR(20) NOT NULL,
        email TEXT UNIQUE,
        age INTEGER,
        tags JSON,
        active BOOLEAN NOT NULL DEFAULT 1,
        joined DATE,
        created_at DATETIME,
        updated_at DATETIME,
        deleted_at DATETIME
    );
    CREATE TABLE gifts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        donor_id TEXT REFERENCES donors(id),
        amount DECIMAL(10,2) NOT NULL,
        category TEXT,
        created_at DATETIME,
        updated_at DATETIME
    );
";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a record from a JSON object literal.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn donor(name: &str, email: &str) -> Record {
    record(json!({ "name": name, "email": email }))
}

pub fn gift(donor_id: &Value, amount: f64, category: &str) -> Record {
    record(json!({ "donor_id": donor_id, "amount": amount, "category": category }))
}

pub fn donors_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("donors").with_soft_delete(true)
}

pub fn gifts_descriptor() -> EntityDescriptor {
    EntityDescriptor::new("gifts")
}

pub async fn sqlite_pool() -> Arc<SqlitePool> {
    init_tracing();
    let pool = SqlitePool::open_in_memory().unwrap();
    pool.execute_batch(SCHEMA).await.unwrap();
    Arc::new(pool)
}

pub async fn donors_engine() -> RecordEngine<SqlitePool> {
    RecordEngine::open(sqlite_pool().await, donors_descriptor())
        .await
        .unwrap()
}

/// Engines for both tables over one database.
pub async fn engines() -> (RecordEngine<SqlitePool>, RecordEngine<SqlitePool>) {
    let pool = sqlite_pool().await;
    let donors = RecordEngine::open(pool.clone(), donors_descriptor())
        .await
        .unwrap();
    let gifts = RecordEngine::open(pool, gifts_descriptor()).await.unwrap();
    (donors, gifts)
}

// ── Instrumented pool ────────────────────────────────────────────

/// A SQLite pool that records every statement run through it and can be
/// told to fail the next few statements.
pub struct TestPool {
    inner: SqlitePool,
    statements: Mutex<Vec<String>>,
    failures: Mutex<Option<(u32, StoreErrorCode)>>,
}

impl TestPool {
    pub async fn new() -> Arc<Self> {
        init_tracing();
        let inner = SqlitePool::open_in_memory().unwrap();
        inner.execute_batch(SCHEMA).await.unwrap();
        Arc::new(Self {
            inner,
            statements: Mutex::new(Vec::new()),
            failures: Mutex::new(None),
        })
    }

    pub fn sqlite(&self) -> &SqlitePool {
        &self.inner
    }

    /// Makes the next `count` statements fail with `code`.
    pub fn fail_next(&self, count: u32, code: StoreErrorCode) {
        *self.failures.lock().unwrap() = Some((count, code));
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|sql| sql.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Executor for TestPool {
    async fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        self.statements.lock().unwrap().push(sql.to_string());
        let injected = {
            let mut failures = self.failures.lock().unwrap();
            match failures.as_mut() {
                Some((left, code)) if *left > 0 => {
                    *left -= 1;
                    Some(*code)
                }
                _ => None,
            }
        };
        if let Some(code) = injected {
            return Err(StoreError::new(code, "injected failure"));
        }
        self.inner.execute(sql, params).await
    }
}

#[async_trait]
impl ConnectionPool for TestPool {
    type Connection = SqliteConnection;

    async fn acquire_connection(&self) -> StoreResult<SqliteConnection> {
        self.inner.acquire_connection().await
    }
}

// ── Observer ─────────────────────────────────────────────────────

/// Records lifecycle events as short strings.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

fn name_of(record: &Record) -> String {
    record
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string()
}

impl RecordObserver for RecordingObserver {
    fn after_create(&self, record: &Record) {
        self.events
            .lock()
            .unwrap()
            .push(format!("create:{}", name_of(record)));
    }

    fn after_update(&self, before: &Record, after: &Record) {
        self.events
            .lock()
            .unwrap()
            .push(format!("update:{}->{}", name_of(before), name_of(after)));
    }

    fn after_delete(&self, record: &Record, mode: DeleteMode) {
        self.events
            .lock()
            .unwrap()
            .push(format!("delete:{}:{mode:?}", name_of(record)));
    }
}
