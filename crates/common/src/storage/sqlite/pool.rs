//! SQLite connection pool
//!
//! r2d2 pool whose connections all carry the pragmas from
//! [`SqlitePoolConfig`].

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::connection::SqliteConnection;
use super::pragmas::apply_connection_pragmas;
use crate::storage::error::{StorageError, StorageResult};

/// SQLite connection pool
#[derive(Debug)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
}

impl SqlitePool {
    /// Open (creating if needed) the database at `path` and build the pool.
    ///
    /// A test connection is acquired before returning so a bad path fails
    /// here rather than on first use.
    #[instrument(fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        if config.max_size == 0 {
            return Err(StorageError::InvalidConfig("pool size must be at least 1".into()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let pragma_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pragma_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!("Failed to create connection pool: {}", e);
                StorageError::Connection(format!("Failed to create pool: {e}"))
            })?;

        info!("SQLite pool created with {} connections", config.max_size);
        Ok(Self { pool, config })
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> StorageResult<SqliteConnection> {
        let start = std::time::Instant::now();
        match self.pool.get() {
            Ok(conn) => {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "connection acquired");
                Ok(SqliteConnection::new(conn))
            }
            Err(e) => {
                if e.to_string().to_lowercase().contains("timed out") {
                    warn!("Connection timeout after {:?}", self.config.connection_timeout);
                    Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
                } else {
                    warn!("Connection error: {}", e);
                    Err(StorageError::Connection(format!("Failed to get connection: {e}")))
                }
            }
        }
    }

    pub fn max_size(&self) -> u32 {
        self.config.max_size
    }

    /// Connections currently open and idle.
    pub fn state(&self) -> (u32, u32) {
        let state = self.pool.state();
        (state.connections, state.idle_connections)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    /// Validates `SqlitePool::new` for the basic query scenario.
    ///
    /// Assertions:
    /// - Confirms `count` equals `1` after one insert.
    #[test]
    fn creates_pool_and_runs_queries() {
        let temp_dir = TempDir::new().unwrap();
        let pool =
            SqlitePool::new(&temp_dir.path().join("pool.db"), SqlitePoolConfig::default()).unwrap();

        let conn = pool.get_connection().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", []).unwrap();
        conn.execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    /// Validates `SqlitePool::new` creates the parent directories.
    ///
    /// Assertions:
    /// - Ensures `nested.exists()` evaluates to true.
    #[test]
    fn creates_missing_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("ledger.db");
        let pool = SqlitePool::new(&nested, SqlitePoolConfig::default()).unwrap();
        drop(pool.get_connection().unwrap());
        assert!(nested.exists());
    }

    /// Validates `SqlitePool::new` rejects `max_size: 0`.
    ///
    /// Assertions:
    /// - Ensures the error matches `StorageError::InvalidConfig(_)`.
    #[test]
    fn rejects_zero_sized_pool() {
        let temp_dir = TempDir::new().unwrap();
        let config = SqlitePoolConfig { max_size: 0, ..SqlitePoolConfig::default() };
        let err = SqlitePool::new(&temp_dir.path().join("zero.db"), config).unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }

    /// Validates pooled connections across concurrent threads.
    ///
    /// Assertions:
    /// - Confirms every thread's insert is visible afterwards.
    #[test]
    fn connections_are_shared_across_threads() {
        let temp_dir = TempDir::new().unwrap();
        let pool = Arc::new(
            SqlitePool::new(&temp_dir.path().join("threads.db"), SqlitePoolConfig::default())
                .unwrap(),
        );
        pool.get_connection()
            .unwrap()
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", [])
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let conn = pool.get_connection().unwrap();
                    conn.execute("INSERT INTO t (v) VALUES (?1)", [format!("thread_{i}")])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let conn = pool.get_connection().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 4);
    }
}
