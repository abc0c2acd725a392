//! SQLite implementations of the ledger, registry and queue ports.

pub mod manager;
pub mod media_ledger_repository;
pub mod sync_ledger_repository;
pub mod target_repository;
pub mod task_queue_repository;
pub mod term_mapping_repository;

pub use manager::DbManager;
pub use media_ledger_repository::SqliteMediaLedger;
pub use sync_ledger_repository::SqliteSyncLedger;
pub use target_repository::SqliteTargetRepository;
pub use task_queue_repository::SqliteTaskQueue;
pub use term_mapping_repository::SqliteTermMappings;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use rusqlite::params;
    use tempfile::TempDir;

    use super::DbManager;

    pub const TARGET: &str = "target-a";
    pub const OTHER: &str = "target-b";

    /// Migrated database in `dir` with bare target rows for `ids`.
    pub fn manager_with_targets(dir: &TempDir, ids: &[&str]) -> Arc<DbManager> {
        let manager = DbManager::new(dir.path().join("ledger.db"), 2).unwrap();
        manager.run_migrations().unwrap();
        let conn = manager.get_connection().unwrap();
        for id in ids {
            conn.execute(
                "INSERT INTO targets (id, name, base_url, username, active, created_at, updated_at)
                 VALUES (?1, ?1, 'https://example.test', 'editor', 1, 0, 0)",
                params![id],
            )
            .unwrap();
        }
        Arc::new(manager)
    }
}
