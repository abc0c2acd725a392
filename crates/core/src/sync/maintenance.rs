//! Ledger maintenance: recovers records abandoned mid-flight and prunes old
//! media rows. Driven on a schedule by the infra sweeper.

use std::sync::Arc;

use relaypost_domain::Result;
use tracing::{info, instrument};

use super::ports::{MediaLedger, SyncLedger, TaskQueue};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub stuck_syncs: u64,
    pub stuck_uploads: u64,
    pub purged_media: u64,
    pub requeued_tasks: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct LedgerMaintenance {
    ledger: Arc<dyn SyncLedger>,
    media_ledger: Arc<dyn MediaLedger>,
    queue: Arc<dyn TaskQueue>,
}

impl LedgerMaintenance {
    pub fn new(
        ledger: Arc<dyn SyncLedger>,
        media_ledger: Arc<dyn MediaLedger>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self { ledger, media_ledger, queue }
    }

    /// Fail `syncing`/`uploading` rows untouched for `stuck_after_secs`,
    /// return abandoned deferred tasks to the queue and purge successful
    /// media rows older than `media_ttl_secs`.
    #[instrument(skip(self))]
    pub async fn sweep(
        &self,
        now: i64,
        stuck_after_secs: i64,
        media_ttl_secs: i64,
    ) -> Result<SweepReport> {
        let stuck_before = now - stuck_after_secs;
        let report = SweepReport {
            stuck_syncs: self.ledger.sweep_stuck(stuck_before).await?,
            stuck_uploads: self.media_ledger.sweep_stuck(stuck_before).await?,
            purged_media: self.media_ledger.purge_succeeded(now - media_ttl_secs).await?,
            requeued_tasks: self.queue.requeue_stale(stuck_before).await?,
        };

        if !report.is_empty() {
            info!(
                stuck_syncs = report.stuck_syncs,
                stuck_uploads = report.stuck_uploads,
                purged_media = report.purged_media,
                requeued_tasks = report.requeued_tasks,
                "ledger sweep"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use relaypost_domain::constants::{STUCK_SYNC_MARKER, STUCK_UPLOAD_MARKER};
    use relaypost_domain::{now_ts, MediaSyncStatus, SyncKind, SyncStatus};

    use super::*;
    use crate::testing::{media, TestEnv};

    fn maintenance(env: &TestEnv) -> LedgerMaintenance {
        LedgerMaintenance::new(env.ledger.clone(), env.media_ledger.clone(), env.queue.clone())
    }

    #[tokio::test]
    async fn stuck_records_fail_with_timeout_marker() {
        let env = TestEnv::new();
        let now = now_ts();
        env.ledger.create_or_reset("a", 1, SyncKind::Create, None).await.unwrap();
        env.ledger.transition("a", 1, SyncStatus::Syncing, None, None).await.unwrap();
        env.ledger.create_or_reset("a", 2, SyncKind::Create, None).await.unwrap();
        env.ledger.transition("a", 2, SyncStatus::Syncing, None, None).await.unwrap();
        env.ledger.set_updated_at("a", 1, now - 601);

        let hero = media(7, "hero.jpg");
        env.media_ledger.begin("a", &hero).await.unwrap();
        env.media_ledger.transition("a", 7, MediaSyncStatus::Uploading, None, None).await.unwrap();
        env.media_ledger.set_timestamps("a", 7, now - 601);

        let report = maintenance(&env).sweep(now, 600, 3600).await.unwrap();

        assert_eq!(report.stuck_syncs, 1);
        assert_eq!(report.stuck_uploads, 1);
        let stuck = env.ledger.get("a", 1).await.unwrap().unwrap();
        assert_eq!(stuck.status, SyncStatus::Failed);
        assert_eq!(stuck.last_error.as_deref(), Some(STUCK_SYNC_MARKER));
        assert_eq!(env.ledger.get("a", 2).await.unwrap().unwrap().status, SyncStatus::Syncing);
        let upload = env.media_ledger.get("a", 7).await.unwrap().unwrap();
        assert_eq!(upload.status, MediaSyncStatus::Failed);
        assert_eq!(upload.last_error.as_deref(), Some(STUCK_UPLOAD_MARKER));
    }

    #[tokio::test]
    async fn old_successful_media_is_purged() {
        let env = TestEnv::new();
        let now = now_ts();
        for (id, file) in [(1, "old.png"), (2, "new.png")] {
            let asset = media(id, file);
            env.media_ledger.begin("a", &asset).await.unwrap();
            env.media_ledger
                .transition("a", id, MediaSyncStatus::Uploading, None, None)
                .await
                .unwrap();
            env.media_ledger
                .transition("a", id, MediaSyncStatus::Success, Some((id + 100, file.into())), None)
                .await
                .unwrap();
        }
        env.media_ledger.set_timestamps("a", 1, now - 7200);

        let report = maintenance(&env).sweep(now, 600, 3600).await.unwrap();

        assert_eq!(report.purged_media, 1);
        assert!(env.media_ledger.get("a", 1).await.unwrap().is_none());
        assert!(env.media_ledger.get("a", 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn quiet_ledgers_produce_an_empty_report() {
        let env = TestEnv::new();
        let report = maintenance(&env).sweep(now_ts(), 600, 3600).await.unwrap();
        assert!(report.is_empty());
    }
}
