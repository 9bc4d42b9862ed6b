use std::time::Duration;

use hearth_db::{Connection, ConnectionPool, Executor, SqlitePool, StoreErrorCode};
use pretty_assertions::assert_eq;
use serde_json::json;

async fn make_pool() -> SqlitePool {
    let pool = SqlitePool::open_in_memory().unwrap();
    pool.execute_batch(
        "
        CREATE TABLE families (
            id TEXT PRIMARY KEY,
            name VARCHAR(50) NOT NULL UNIQUE,
            members INTEGER,
            score REAL,
            active BOOLEAN,
            photo BLOB
        );
        CREATE TABLE donations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            family_id TEXT NOT NULL REFERENCES families(id),
            amount REAL NOT NULL
        );
        ",
    )
    .await
    .unwrap();
    pool
}

// ── Executor ─────────────────────────────────────────────────────

#[tokio::test]
async fn insert_then_select_round_trips_values() {
    let pool = make_pool().await;
    let inserted = pool
        .execute(
            "INSERT INTO families (id, name, members, score, active) VALUES (?, ?, ?, ?, ?)",
            &[json!("f1"), json!("Haddad"), json!(5), json!(2.5), json!(true)],
        )
        .await
        .unwrap();
    assert!(inserted.is_empty());

    let rows = pool
        .execute("SELECT id, name, members, score, active FROM families WHERE id = ?", &[json!("f1")])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["id"], json!("f1"));
    assert_eq!(row["name"], json!("Haddad"));
    assert_eq!(row["members"], json!(5));
    assert_eq!(row["score"], json!(2.5));
    assert_eq!(row["active"], json!(1));
}

#[tokio::test]
async fn returning_clause_yields_rows() {
    let pool = make_pool().await;
    pool.execute("INSERT INTO families (id, name) VALUES ('f1', 'A')", &[])
        .await
        .unwrap();
    let rows = pool
        .execute(
            "INSERT INTO donations (family_id, amount) VALUES (?, ?), (?, ?) RETURNING id",
            &[json!("f1"), json!(10), json!("f1"), json!(20)],
        )
        .await
        .unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn structured_params_bound_as_json_text() {
    let pool = make_pool().await;
    pool.execute(
        "INSERT INTO families (id, name) VALUES (?, ?)",
        &[json!("f1"), json!({"first": "A"})],
    )
    .await
    .unwrap();
    let rows = pool.execute("SELECT name FROM families", &[]).await.unwrap();
    assert_eq!(rows[0]["name"], json!(r#"{"first":"A"}"#));
}

#[tokio::test]
async fn blobs_are_hex_encoded() {
    let pool = make_pool().await;
    pool.execute("INSERT INTO families (id, name, photo) VALUES ('f1', 'A', X'CAFE')", &[])
        .await
        .unwrap();
    let rows = pool.execute("SELECT photo FROM families", &[]).await.unwrap();
    assert_eq!(rows[0]["photo"], json!("cafe"));
}

// ── Error classification ─────────────────────────────────────────

#[tokio::test]
async fn duplicate_key_is_classified() {
    let pool = make_pool().await;
    let sql = "INSERT INTO families (id, name) VALUES (?, ?)";
    pool.execute(sql, &[json!("f1"), json!("A")]).await.unwrap();
    let err = pool.execute(sql, &[json!("f2"), json!("A")]).await.unwrap_err();
    assert_eq!(err.code, StoreErrorCode::DuplicateKey);
    assert!(!err.is_retryable());
    assert_eq!(err.sql.as_deref(), Some(sql));
    assert_eq!(err.params, vec![json!("f2"), json!("A")]);
}

#[tokio::test]
async fn missing_reference_is_classified() {
    let pool = make_pool().await;
    let err = pool
        .execute(
            "INSERT INTO donations (family_id, amount) VALUES (?, ?)",
            &[json!("nobody"), json!(1)],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, StoreErrorCode::ForeignKey);
}

#[tokio::test]
async fn syntax_errors_are_generic_and_retryable() {
    let pool = make_pool().await;
    let err = pool.execute("SELEC nothing", &[]).await.unwrap_err();
    assert_eq!(err.code, StoreErrorCode::Other);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("SELEC nothing"));
}

#[test]
fn unopenable_file_is_connection_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("db.sqlite");
    let err = SqlitePool::open(&path, 1).err().unwrap();
    assert_eq!(err.code, StoreErrorCode::ConnectionRefused);
}

// ── Connections and transactions ─────────────────────────────────

#[tokio::test]
async fn connection_returns_to_pool_on_drop() {
    let pool = make_pool().await;
    assert_eq!(pool.idle_connections(), 1);
    {
        let _conn = pool.acquire_connection().await.unwrap();
        assert_eq!(pool.idle_connections(), 0);
    }
    assert_eq!(pool.idle_connections(), 1);
}

#[tokio::test]
async fn commit_persists_and_rollback_discards() {
    let pool = make_pool().await;

    let conn = pool.acquire_connection().await.unwrap();
    conn.begin_transaction().await.unwrap();
    conn.execute("INSERT INTO families (id, name) VALUES ('kept', 'K')", &[])
        .await
        .unwrap();
    conn.commit().await.unwrap();

    conn.begin_transaction().await.unwrap();
    assert!(conn.in_transaction());
    conn.execute("INSERT INTO families (id, name) VALUES ('gone', 'G')", &[])
        .await
        .unwrap();
    conn.rollback().await.unwrap();
    assert!(!conn.in_transaction());
    drop(conn);

    let rows = pool.execute("SELECT id FROM families", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], json!("kept"));
}

#[tokio::test]
async fn dropping_open_transaction_rolls_back() {
    let pool = make_pool().await;
    {
        let conn = pool.acquire_connection().await.unwrap();
        conn.begin_transaction().await.unwrap();
        conn.execute("INSERT INTO families (id, name) VALUES ('x', 'X')", &[])
            .await
            .unwrap();
    }
    let rows = pool.execute("SELECT COUNT(*) AS n FROM families", &[]).await.unwrap();
    assert_eq!(rows[0]["n"], json!(0));
}

#[tokio::test]
async fn dropped_transaction_hands_back_its_connection() {
    let pool = SqlitePool::open_in_memory_with_size(2).unwrap();
    pool.execute_batch("CREATE TABLE t (n INTEGER)").await.unwrap();
    {
        let conn = pool.acquire_connection().await.unwrap();
        conn.begin_transaction().await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
    }

    // Both permits are only available once the rollback has finished.
    let a = pool.acquire_connection().await.unwrap();
    let b = pool.acquire_connection().await.unwrap();
    let rows = a.execute("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
    assert_eq!(rows[0]["n"], json!(0));
    drop((a, b));
    assert_eq!(pool.idle_connections(), 2);
}

#[test]
fn connection_dropped_outside_a_runtime_still_rolls_back() {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let pool = SqlitePool::open_in_memory().unwrap();
    let conn = rt.block_on(async {
        pool.execute_batch("CREATE TABLE t (n INTEGER)").await.unwrap();
        let conn = pool.acquire_connection().await.unwrap();
        conn.begin_transaction().await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        conn
    });

    drop(conn);
    assert_eq!(pool.idle_connections(), 1);
    let rows = rt
        .block_on(pool.execute("SELECT COUNT(*) AS n FROM t", &[]))
        .unwrap();
    assert_eq!(rows[0]["n"], json!(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_memory_reader_waits_for_open_transaction() {
    let pool = SqlitePool::open_in_memory_with_size(2).unwrap();
    pool.execute_batch("CREATE TABLE t (n INTEGER)").await.unwrap();

    let writer = pool.acquire_connection().await.unwrap();
    writer.begin_transaction().await.unwrap();
    writer.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();

    let reader = tokio::spawn({
        let pool = pool.clone();
        async move { pool.execute("SELECT COUNT(*) AS n FROM t", &[]).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    writer.commit().await.unwrap();
    drop(writer);

    let rows = reader.await.unwrap().unwrap();
    assert_eq!(rows[0]["n"], json!(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_pool_serves_concurrent_readers() {
    let dir = tempfile::tempdir().unwrap();
    let pool = SqlitePool::open(dir.path().join("hearth.db"), 4).unwrap();
    pool.execute_batch("CREATE TABLE t (n INTEGER); INSERT INTO t VALUES (1), (2), (3);")
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        pool.execute("SELECT COUNT(*) AS n FROM t", &[]),
        pool.execute("SELECT SUM(n) AS s FROM t", &[]),
    );
    assert_eq!(a.unwrap()[0]["n"], json!(3));
    assert_eq!(b.unwrap()[0]["s"], json!(6));
    assert_eq!(pool.size(), 4);
}
