//! SQLite-backed [`TaskQueue`] of deferred sync descriptors.
//!
//! A partial unique index keeps at most one `pending` task per
//! (item, target); `enqueue` returns the waiting task's id instead of adding
//! a second one.

use std::sync::Arc;

use async_trait::async_trait;
use relaypost_core::TaskQueue;
use relaypost_domain::constants::truncate_error;
use relaypost_domain::{RelayPostError, Result, SyncTask, TaskStatus};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::{
    i64_to_u32, i64_to_u64, map_join_error, map_sql_error, parse_column, u64_to_i64,
    usize_to_i64, DbManager,
};

const SUPERSEDED_MARKER: &str = "superseded by a newer pending task";

pub struct SqliteTaskQueue {
    db: Arc<DbManager>,
}

impl SqliteTaskQueue {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let id = task_id.to_string();
        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(SET_STATUS_SQL, params![id, status.as_str(), error])
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(RelayPostError::NotFound(format!("task {id}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    /// Every task touching `target_id`, newest first.
    pub async fn list_for_target(&self, target_id: &str) -> Result<Vec<SyncTask>> {
        let db = Arc::clone(&self.db);
        let target = target_id.to_string();
        task::spawn_blocking(move || -> Result<Vec<SyncTask>> {
            let conn = db.get_connection()?;
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM sync_tasks WHERE target_id = ?1
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt.query_map(params![target], map_task_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    #[instrument(skip(self, task), fields(item_id = task.item_id, target_id = %task.target_id))]
    async fn enqueue(&self, task: &SyncTask) -> Result<String> {
        let db = Arc::clone(&self.db);
        let row = task.clone();
        let item = u64_to_i64(row.item_id)?;
        task::spawn_blocking(move || -> Result<String> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let waiting: Option<String> = tx
                .query_row(PENDING_FOR_PAIR_SQL, params![item, row.target_id], |found| found.get(0))
                .optional()
                .map_err(map_sql_error)?;
            if let Some(existing) = waiting {
                debug!(task_id = %existing, "task already pending");
                return Ok(existing);
            }
            tx.execute(
                INSERT_TASK_SQL,
                params![
                    row.id,
                    item,
                    row.target_id,
                    row.kind.as_str(),
                    row.status.as_str(),
                    row.run_at,
                    row.attempts,
                    row.last_error,
                    row.created_at
                ],
            )
            .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(row.id)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn due(&self, limit: usize, now: i64) -> Result<Vec<SyncTask>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<Vec<SyncTask>> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let due = {
                let sql = format!(
                    "SELECT {TASK_COLUMNS} FROM sync_tasks
                     WHERE status = 'pending' AND run_at <= ?1
                     ORDER BY run_at, created_at
                     LIMIT ?2"
                );
                let mut stmt = tx.prepare(&sql).map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![now, usize_to_i64(limit)], map_task_row)
                    .map_err(map_sql_error)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
            };
            let mut claimed = Vec::with_capacity(due.len());
            for mut task in due {
                tx.execute(CLAIM_TASK_SQL, params![task.id, now]).map_err(map_sql_error)?;
                task.status = TaskStatus::Running;
                task.attempts += 1;
                claimed.push(task);
            }
            tx.commit().map_err(map_sql_error)?;
            Ok(claimed)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn complete(&self, task_id: &str) -> Result<()> {
        self.set_status(task_id, TaskStatus::Done, None).await
    }

    async fn fail(&self, task_id: &str, error: &str) -> Result<()> {
        self.set_status(task_id, TaskStatus::Failed, Some(truncate_error(error))).await
    }

    #[instrument(skip(self))]
    async fn requeue_stale(&self, claimed_before: i64) -> Result<u64> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<u64> {
            let mut conn = db.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let requeued =
                tx.execute(REQUEUE_STALE_SQL, params![claimed_before]).map_err(map_sql_error)?;
            // Stale tasks whose pair already has a pending task cannot go back.
            tx.execute(FAIL_SUPERSEDED_SQL, params![claimed_before, SUPERSEDED_MARKER])
                .map_err(map_sql_error)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(requeued as u64)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const TASK_COLUMNS: &str =
    "id, item_id, target_id, kind, status, run_at, attempts, last_error, created_at";

const PENDING_FOR_PAIR_SQL: &str = "SELECT id FROM sync_tasks
    WHERE item_id = ?1 AND target_id = ?2 AND status = 'pending'";

const INSERT_TASK_SQL: &str = "INSERT INTO sync_tasks
        (id, item_id, target_id, kind, status, run_at, attempts, last_error, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const CLAIM_TASK_SQL: &str = "UPDATE sync_tasks
    SET status = 'running', attempts = attempts + 1, claimed_at = ?2
    WHERE id = ?1";

const SET_STATUS_SQL: &str = "UPDATE sync_tasks
    SET status = ?2, last_error = COALESCE(?3, last_error), claimed_at = NULL
    WHERE id = ?1";

const REQUEUE_STALE_SQL: &str = "UPDATE OR IGNORE sync_tasks
    SET status = 'pending', claimed_at = NULL
    WHERE status = 'running' AND claimed_at < ?1";

const FAIL_SUPERSEDED_SQL: &str = "UPDATE sync_tasks
    SET status = 'failed', last_error = ?2, claimed_at = NULL
    WHERE status = 'running' AND claimed_at < ?1";

fn map_task_row(row: &Row<'_>) -> rusqlite::Result<SyncTask> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(SyncTask {
        id: row.get(0)?,
        item_id: i64_to_u64(row.get(1)?),
        target_id: row.get(2)?,
        kind: parse_column(3, &kind)?,
        status: parse_column(4, &status)?,
        run_at: row.get(5)?,
        attempts: i64_to_u32(row.get(6)?),
        last_error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use relaypost_domain::{now_ts, SyncKind};
    use tempfile::TempDir;

    use super::*;
    use crate::database::test_support::{manager_with_targets, TARGET};

    fn task(id: &str, item_id: u64, run_at: i64) -> SyncTask {
        SyncTask {
            id: id.into(),
            item_id,
            target_id: TARGET.into(),
            kind: SyncKind::Create,
            status: TaskStatus::Pending,
            run_at,
            attempts: 0,
            last_error: None,
            created_at: now_ts(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_is_idempotent_per_pair() {
        let dir = TempDir::new().unwrap();
        let queue = SqliteTaskQueue::new(manager_with_targets(&dir, &[TARGET]));

        assert_eq!(queue.enqueue(&task("t1", 1, 0)).await.unwrap(), "t1");
        assert_eq!(queue.enqueue(&task("t2", 1, 0)).await.unwrap(), "t1");
        assert_eq!(queue.enqueue(&task("t3", 2, 0)).await.unwrap(), "t3");
        assert_eq!(queue.list_for_target(TARGET).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn due_claims_only_ready_tasks_in_order() {
        let dir = TempDir::new().unwrap();
        let queue = SqliteTaskQueue::new(manager_with_targets(&dir, &[TARGET]));
        let now = now_ts();
        queue.enqueue(&task("late", 1, now + 3600)).await.unwrap();
        queue.enqueue(&task("second", 2, now - 10)).await.unwrap();
        queue.enqueue(&task("first", 3, now - 20)).await.unwrap();

        let claimed = queue.due(10, now).await.unwrap();

        assert_eq!(claimed.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["first", "second"]);
        assert!(claimed.iter().all(|t| t.status == TaskStatus::Running && t.attempts == 1));
        assert!(queue.due(10, now).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn claimed_task_frees_the_pair_for_a_new_one() {
        let dir = TempDir::new().unwrap();
        let queue = SqliteTaskQueue::new(manager_with_targets(&dir, &[TARGET]));
        queue.enqueue(&task("t1", 1, 0)).await.unwrap();
        queue.due(1, now_ts()).await.unwrap();

        assert_eq!(queue.enqueue(&task("t2", 1, 0)).await.unwrap(), "t2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn complete_and_fail_record_outcomes() {
        let dir = TempDir::new().unwrap();
        let queue = SqliteTaskQueue::new(manager_with_targets(&dir, &[TARGET]));
        queue.enqueue(&task("ok", 1, 0)).await.unwrap();
        queue.enqueue(&task("bad", 2, 0)).await.unwrap();
        queue.due(10, now_ts()).await.unwrap();

        queue.complete("ok").await.unwrap();
        queue.fail("bad", "server: HTTP 500").await.unwrap();

        let tasks = queue.list_for_target(TARGET).await.unwrap();
        let status = |id: &str| tasks.iter().find(|t| t.id == id).map(|t| (t.status, t.last_error.clone()));
        assert_eq!(status("ok"), Some((TaskStatus::Done, None)));
        assert_eq!(status("bad"), Some((TaskStatus::Failed, Some("server: HTTP 500".into()))));
        assert!(matches!(queue.complete("missing").await, Err(RelayPostError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_running_tasks_return_to_pending() {
        let dir = TempDir::new().unwrap();
        let queue = SqliteTaskQueue::new(manager_with_targets(&dir, &[TARGET]));
        let now = now_ts();
        queue.enqueue(&task("t1", 1, 0)).await.unwrap();
        queue.due(1, now - 900).await.unwrap();

        assert_eq!(queue.requeue_stale(now - 1000).await.unwrap(), 0);
        assert_eq!(queue.requeue_stale(now - 600).await.unwrap(), 1);

        let again = queue.due(1, now).await.unwrap();
        assert_eq!(again[0].id, "t1");
        assert_eq!(again[0].attempts, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_task_superseded_by_pending_one_is_failed() {
        let dir = TempDir::new().unwrap();
        let queue = SqliteTaskQueue::new(manager_with_targets(&dir, &[TARGET]));
        let now = now_ts();
        queue.enqueue(&task("old", 1, 0)).await.unwrap();
        queue.due(1, now - 900).await.unwrap();
        queue.enqueue(&task("new", 1, now + 60)).await.unwrap();

        assert_eq!(queue.requeue_stale(now - 600).await.unwrap(), 0);

        let tasks = queue.list_for_target(TARGET).await.unwrap();
        let old = tasks.iter().find(|t| t.id == "old").unwrap();
        assert_eq!(old.status, TaskStatus::Failed);
        assert_eq!(old.last_error.as_deref(), Some(SUPERSEDED_MARKER));
    }
}
