//! Sync orchestration across targets.
//!
//! Resolves the target selection, dispatches the per-target pipeline in
//! the requested mode and aggregates the results. Per-target failures are
//! isolated: one target failing never stops the others.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use relaypost_domain::{
    now_ts, ContentItem, DispatchMode, RelayPostError, SyncKind, SyncStatus, SyncTask, Target,
    TaskStatus,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn, Instrument};
use uuid::Uuid;

use super::errors::SyncError;
use super::pipeline::{Submission, TargetPipeline};
use super::ports::{
    ContentSource, MediaLedger, SettingsStore, SyncLedger, TargetRepository, TaskQueue,
};
use super::report::{SyncOutcome, SyncReport, TargetReport, TargetResult};

/// Which targets a request applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// Every active target.
    All,
    /// Explicit ids. Unknown ids are rejected; inactive ones are skipped.
    Ids(Vec<String>),
}

/// Request-level failures. Per-target failures live in [`SyncReport`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No active targets selected")]
    NoTargets,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("All targets failed ({})", .0.summary())]
    AllFailed(SyncReport),
}

impl From<RelayPostError> for OrchestratorError {
    fn from(err: RelayPostError) -> Self {
        match err {
            RelayPostError::NotFound(msg) | RelayPostError::InvalidInput(msg) => {
                Self::InvalidRequest(msg)
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Outcome of [`SyncOrchestrator::retry_failed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    /// Failed posts reset to `pending` and queued for the worker.
    pub queued: u64,
    /// Failed media uploads reset to `pending`; the next sync of a post
    /// that references them uploads them again.
    pub media_reset: u64,
}

pub struct SyncOrchestrator {
    pipeline: Arc<TargetPipeline>,
    targets: Arc<dyn TargetRepository>,
    content: Arc<dyn ContentSource>,
    ledger: Arc<dyn SyncLedger>,
    media_ledger: Arc<dyn MediaLedger>,
    queue: Arc<dyn TaskQueue>,
    settings: Arc<dyn SettingsStore>,
}

impl SyncOrchestrator {
    pub fn new(
        pipeline: Arc<TargetPipeline>,
        targets: Arc<dyn TargetRepository>,
        content: Arc<dyn ContentSource>,
        ledger: Arc<dyn SyncLedger>,
        media_ledger: Arc<dyn MediaLedger>,
        queue: Arc<dyn TaskQueue>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self { pipeline, targets, content, ledger, media_ledger, queue, settings }
    }

    /// Sync `item_id` to the selected targets.
    ///
    /// `mode` overrides the configured dispatch mode. Returns
    /// [`OrchestratorError::AllFailed`] when no target succeeded.
    pub async fn sync(
        &self,
        item_id: u64,
        selection: TargetSelection,
        mode: Option<DispatchMode>,
    ) -> Result<SyncReport, OrchestratorError> {
        self.sync_with_cancel(item_id, selection, mode, &CancellationToken::new()).await
    }

    /// Like [`Self::sync`]; serial dispatch stops starting new targets once
    /// `cancel` fires and reports the remaining ones as cancelled.
    #[instrument(skip(self, selection, cancel))]
    pub async fn sync_with_cancel(
        &self,
        item_id: u64,
        selection: TargetSelection,
        mode: Option<DispatchMode>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, OrchestratorError> {
        let item = self.content.get_item(item_id).await?;
        item.validate()?;
        let targets = self.select_targets(&selection).await?;
        let mode = mode.unwrap_or_else(|| self.settings.settings().dispatch_mode());

        info!(item_id, targets = targets.len(), mode = %mode, "dispatching sync");
        let results = match mode {
            DispatchMode::Serial => self.dispatch_serial(&targets, &item, cancel).await,
            DispatchMode::Parallel => self.dispatch_parallel(targets, item).await,
            DispatchMode::Deferred => self.dispatch_deferred(&targets, item_id).await,
        };

        Self::conclude(SyncReport::new(item_id, mode, results))
    }

    /// Delete the remote copies of `item_id` on the selected targets.
    #[instrument(skip(self, selection))]
    pub async fn delete(
        &self,
        item_id: u64,
        selection: TargetSelection,
    ) -> Result<SyncReport, OrchestratorError> {
        if item_id == 0 {
            return Err(OrchestratorError::InvalidRequest(
                "content item id must be non-zero".into(),
            ));
        }
        let targets = self.select_targets(&selection).await?;

        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            results.push(self.pipeline.delete(target, item_id).await);
        }
        Self::conclude(SyncReport::new(item_id, DispatchMode::Serial, results))
    }

    /// Execute one deferred task. Used by the background worker.
    #[instrument(skip(self, task), fields(task_id = %task.id, target_id = %task.target_id, item_id = task.item_id))]
    pub async fn run_task(&self, task: &SyncTask) -> TargetReport {
        let target = match self.targets.get(&task.target_id).await {
            Ok(Some(target)) if target.active => target,
            Ok(Some(_)) => {
                return TargetReport::failed(
                    &task.target_id,
                    SyncError::Config(format!("target {} is inactive", task.target_id)),
                );
            }
            Ok(None) => {
                return TargetReport::failed(
                    &task.target_id,
                    SyncError::NotFound(format!("target {}", task.target_id)),
                );
            }
            Err(err) => return TargetReport::failed(&task.target_id, err.into()),
        };

        if task.kind == SyncKind::Delete {
            return self.pipeline.delete(&target, task.item_id).await;
        }

        match self.load_item(task.item_id).await {
            Ok(item) => self.pipeline.run(&target, &item).await,
            Err(err) => self.pipeline.finalize(&target.id, task.item_id, Err(err)).await,
        }
    }

    /// Reset failed records of `target_id` under the retry cap and queue
    /// the posts for the deferred worker. Failed media of the target goes
    /// back to `pending` under the same cap.
    #[instrument(skip(self))]
    pub async fn retry_failed(
        &self,
        target_id: &str,
        max_retries: u32,
    ) -> Result<RetrySummary, OrchestratorError> {
        if self.targets.get(target_id).await?.is_none() {
            return Err(OrchestratorError::InvalidRequest(format!("unknown target {target_id}")));
        }

        let eligible: Vec<_> = self
            .ledger
            .list_for_target(target_id, Some(SyncStatus::Failed))
            .await?
            .into_iter()
            .filter(|record| record.retry_count < max_retries)
            .collect();
        let reset = self.ledger.retry_failed(target_id, max_retries).await?;
        let media_reset = self.media_ledger.retry_failed(target_id, max_retries).await?;

        let now = now_ts();
        for record in &eligible {
            self.queue.enqueue(&new_task(target_id, record.item_id, record.kind, now)).await?;
        }
        info!(
            target_id,
            reset,
            media_reset,
            queued = eligible.len(),
            "failed syncs queued for retry"
        );
        Ok(RetrySummary { queued: eligible.len() as u64, media_reset })
    }

    async fn load_item(&self, item_id: u64) -> Result<ContentItem, SyncError> {
        let item = self.content.get_item(item_id).await?;
        item.validate()?;
        Ok(item)
    }

    async fn select_targets(
        &self,
        selection: &TargetSelection,
    ) -> Result<Vec<Target>, OrchestratorError> {
        let targets = match selection {
            TargetSelection::All => self.targets.list(true).await?,
            TargetSelection::Ids(ids) => {
                let mut seen = HashSet::new();
                let mut targets = Vec::with_capacity(ids.len());
                for id in ids.iter().filter(|id| seen.insert(id.as_str())) {
                    match self.targets.get(id).await? {
                        Some(target) if target.active => targets.push(target),
                        Some(_) => warn!(target_id = %id, "skipping inactive target"),
                        None => {
                            return Err(OrchestratorError::InvalidRequest(format!(
                                "unknown target {id}"
                            )));
                        }
                    }
                }
                targets
            }
        };

        if targets.is_empty() {
            return Err(OrchestratorError::NoTargets);
        }
        Ok(targets)
    }

    async fn dispatch_serial(
        &self,
        targets: &[Target],
        item: &ContentItem,
        cancel: &CancellationToken,
    ) -> Vec<TargetReport> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            if cancel.is_cancelled() {
                results.push(TargetReport::failed(&target.id, SyncError::Cancelled));
                continue;
            }
            results.push(self.pipeline.run(target, item).await);
        }
        results
    }

    /// Submissions run concurrently; ledger finalization stays sequential
    /// in target order.
    async fn dispatch_parallel(&self, targets: Vec<Target>, item: ContentItem) -> Vec<TargetReport> {
        let item = Arc::new(item);
        let (target_ids, handles): (Vec<String>, Vec<JoinHandle<Result<Submission, SyncError>>>) =
            targets
                .into_iter()
                .map(|target| {
                    let pipeline = Arc::clone(&self.pipeline);
                    let item = Arc::clone(&item);
                    let target_id = target.id.clone();
                    let span = tracing::info_span!("target_sync", target_id = %target.id);
                    let handle = tokio::spawn(
                        async move {
                            let known_id = pipeline.begin(&target, item.id).await?;
                            pipeline.prepare_and_submit(&target, &item, known_id).await
                        }
                        .instrument(span),
                    );
                    (target_id, handle)
                })
                .unzip();

        // Ledger writes happen here, one target at a time, in request order.
        let joined = join_all(handles).await;
        let mut results = Vec::with_capacity(joined.len());
        for (target_id, joined) in target_ids.into_iter().zip(joined) {
            let submitted = match joined {
                Ok(submitted) => submitted,
                Err(join_err) => Err(SyncError::Internal(format!("sync task aborted: {join_err}"))),
            };
            results.push(self.pipeline.finalize(&target_id, item.id, submitted).await);
        }
        results
    }

    async fn dispatch_deferred(&self, targets: &[Target], item_id: u64) -> Vec<TargetReport> {
        let delay = i64::try_from(self.settings.settings().sync_settings.deferred_delay_secs)
            .unwrap_or(i64::MAX);
        let run_at = now_ts().saturating_add(delay);

        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            let result = match self.schedule(&target.id, item_id, run_at).await {
                Ok(task_id) => TargetResult::Scheduled { task_id },
                Err(err) => {
                    warn!(target_id = %target.id, item_id, error = %err, "failed to schedule sync");
                    TargetResult::Failed(err)
                }
            };
            results.push(TargetReport { target_id: target.id.clone(), result });
        }
        results
    }

    async fn schedule(&self, target_id: &str, item_id: u64, run_at: i64) -> Result<String, SyncError> {
        let kind = match self.ledger.get_remote_id(target_id, item_id).await? {
            Some(_) => SyncKind::Update,
            None => SyncKind::Create,
        };
        self.ledger.create_or_reset(target_id, item_id, kind, Some(run_at)).await?;
        let task_id = self.queue.enqueue(&new_task(target_id, item_id, kind, run_at)).await?;
        Ok(task_id)
    }

    fn conclude(report: SyncReport) -> Result<SyncReport, OrchestratorError> {
        match report.outcome() {
            SyncOutcome::AllFailed => {
                warn!(item_id = report.item_id, summary = %report.summary(), "sync failed on every target");
                Err(OrchestratorError::AllFailed(report))
            }
            outcome => {
                info!(item_id = report.item_id, ?outcome, summary = %report.summary(), "sync finished");
                Ok(report)
            }
        }
    }
}

fn new_task(target_id: &str, item_id: u64, kind: SyncKind, run_at: i64) -> SyncTask {
    SyncTask {
        id: Uuid::now_v7().to_string(),
        item_id,
        target_id: target_id.to_string(),
        kind,
        status: TaskStatus::Pending,
        run_at,
        attempts: 0,
        last_error: None,
        created_at: now_ts(),
    }
}
