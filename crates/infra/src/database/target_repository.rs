//! SQLite-backed [`TargetRepository`].

use std::sync::Arc;

use async_trait::async_trait;
use relaypost_core::TargetRepository;
use relaypost_domain::{RelayPostError, Result, Target};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

pub struct SqliteTargetRepository {
    db: Arc<DbManager>,
}

impl SqliteTargetRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Run `sql` against one target id, mapping "no row touched" to `NotFound`.
    async fn touch(&self, target_id: &str, sql: &'static str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = target_id.to_string();
        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn.execute(sql, params![id]).map_err(map_sql_error)?;
            if changed == 0 {
                return Err(RelayPostError::NotFound(format!("target {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl TargetRepository for SqliteTargetRepository {
    async fn save(&self, target: &Target) -> Result<()> {
        let db = Arc::clone(&self.db);
        let target = target.clone();
        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                UPSERT_TARGET_SQL,
                params![
                    target.id,
                    target.name,
                    target.base_url,
                    target.username,
                    target.active,
                    target.created_at,
                    target.updated_at
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get(&self, target_id: &str) -> Result<Option<Target>> {
        let db = Arc::clone(&self.db);
        let id = target_id.to_string();
        task::spawn_blocking(move || -> Result<Option<Target>> {
            let conn = db.get_connection()?;
            let sql = format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?1");
            conn.query_row(&sql, params![id], map_target_row).optional().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Target>> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<Vec<Target>> {
            let conn = db.get_connection()?;
            let sql = format!(
                "SELECT {TARGET_COLUMNS} FROM targets
                 WHERE ?1 = 0 OR active = 1
                 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt.query_map(params![active_only], map_target_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn deactivate(&self, target_id: &str) -> Result<()> {
        self.touch(target_id, DEACTIVATE_TARGET_SQL).await
    }

    async fn delete(&self, target_id: &str) -> Result<()> {
        self.touch(target_id, "DELETE FROM targets WHERE id = ?1").await
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const TARGET_COLUMNS: &str = "id, name, base_url, username, active, created_at, updated_at";

const UPSERT_TARGET_SQL: &str = "INSERT INTO targets
        (id, name, base_url, username, active, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        base_url = excluded.base_url,
        username = excluded.username,
        active = excluded.active,
        updated_at = excluded.updated_at";

const DEACTIVATE_TARGET_SQL: &str = "UPDATE targets
    SET active = 0, updated_at = CAST(strftime('%s','now') AS INTEGER)
    WHERE id = ?1";

fn map_target_row(row: &Row<'_>) -> rusqlite::Result<Target> {
    Ok(Target {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        username: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
