//! End-to-end checks for the pooled SQLite storage.

use relaypost_common::storage::{SqlitePool, SqlitePoolConfig, StorageError};
use tempfile::TempDir;
use tokio_test::assert_ok;

/// Validates data written through one pool is read back by a new pool.
///
/// Assertions:
/// - Confirms `v` equals `"1"` after reopening the file.
#[test]
fn data_survives_pool_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reopen.db");

    {
        let pool = SqlitePool::new(&path, SqlitePoolConfig::default()).unwrap();
        let conn = pool.get_connection().unwrap();
        assert_ok!(conn.execute_batch(
            "CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT NOT NULL);
             INSERT INTO kv (k, v) VALUES ('a', '1');"
        ));
    }

    let pool = SqlitePool::new(&path, SqlitePoolConfig::default()).unwrap();
    let conn = pool.get_connection().unwrap();
    let v: String = conn.query_row("SELECT v FROM kv WHERE k = 'a'", [], |row| row.get(0)).unwrap();
    assert_eq!(v, "1");
}

/// Validates foreign keys are on for pooled connections.
///
/// Assertions:
/// - Ensures the orphan insert fails and the error is not retryable.
#[test]
fn foreign_keys_are_enforced() {
    let temp_dir = TempDir::new().unwrap();
    let pool =
        SqlitePool::new(&temp_dir.path().join("fk.db"), SqlitePoolConfig::default()).unwrap();
    let conn = pool.get_connection().unwrap();
    conn.execute_batch(
        "CREATE TABLE parent (id INTEGER PRIMARY KEY);
         CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id));",
    )
    .unwrap();

    let err = conn.execute("INSERT INTO child (id, parent_id) VALUES (1, 99)", []).unwrap_err();
    assert!(!StorageError::from(err).is_retryable());
}
