//! Background worker draining the deferred sync queue.
//!
//! Polls `sync_tasks` for due tasks, runs each through the same per-target
//! pipeline as an immediate sync, and marks the task done or failed. Join
//! handles are tracked and cancellation is explicit. Cancelling only stops the
//! worker from claiming another batch: a claimed batch always runs to the end,
//! bounded by the per-request timeouts of the HTTP layer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relaypost_core::{SyncOrchestrator, TaskQueue};
//! use relaypost_domain::Settings;
//! use relaypost_infra::scheduling::{DeferredSyncWorker, DeferredWorkerConfig, SchedulerResult};
//!
//! # async fn example(
//! #     orchestrator: Arc<SyncOrchestrator>,
//! #     queue: Arc<dyn TaskQueue>,
//! # ) -> SchedulerResult<()> {
//! let config = DeferredWorkerConfig::from_settings(&Settings::default());
//! let mut worker = DeferredSyncWorker::new(orchestrator, queue, config);
//!
//! worker.start().await?;
//! // ... application runs ...
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use relaypost_core::{SyncOrchestrator, TargetResult, TaskQueue};
use relaypost_domain::{now_ts, Result, Settings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the deferred worker.
#[derive(Debug, Clone)]
pub struct DeferredWorkerConfig {
    /// Maximum number of tasks claimed per tick
    pub batch_size: usize,
    /// Interval between polling attempts
    pub poll_interval: Duration,
}

impl Default for DeferredWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(30),
        }
    }
}

impl DeferredWorkerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.api_settings.batch_size.max(1),
            poll_interval: Duration::from_secs(settings.sync_settings.worker_poll_secs.max(1)),
        }
    }
}

/// Counts from one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Deferred sync worker with explicit lifecycle management.
pub struct DeferredSyncWorker {
    orchestrator: Arc<SyncOrchestrator>,
    queue: Arc<dyn TaskQueue>,
    config: DeferredWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl DeferredSyncWorker {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        queue: Arc<dyn TaskQueue>,
        config: DeferredWorkerConfig,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the worker, spawning the background processing task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let orchestrator = Arc::clone(&self.orchestrator);
        let queue = Arc::clone(&self.queue);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(orchestrator, queue, config, cancel).await;
        });

        self.task_handle = Some(handle);
        info!(
            batch_size = self.config.batch_size,
            poll_secs = self.config.poll_interval.as_secs(),
            "Deferred sync worker started"
        );
        Ok(())
    }

    /// Stop the worker and wait for the processing task to finish.
    ///
    /// A batch already in flight is drained first, so this can take as long
    /// as the slowest claimed task.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task panicked");
                return Err(SchedulerError::TaskJoinFailed(e.to_string()));
            }
        }

        info!("Deferred sync worker stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Process one batch immediately, outside the polling loop.
    pub async fn run_once(&self) -> Result<BatchSummary> {
        Self::process_batch(&self.orchestrator, &self.queue, self.config.batch_size).await
    }

    async fn process_loop(
        orchestrator: Arc<SyncOrchestrator>,
        queue: Arc<dyn TaskQueue>,
        config: DeferredWorkerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Deferred worker process loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    let started = Instant::now();

                    match Self::process_batch(&orchestrator, &queue, config.batch_size).await {
                        Ok(summary) if summary.claimed > 0 => {
                            info!(
                                claimed = summary.claimed,
                                completed = summary.completed,
                                failed = summary.failed,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Deferred batch processed"
                            );
                        }
                        Ok(_) => debug!("No due deferred tasks"),
                        Err(e) => error!(error = %e, "Deferred batch failed"),
                    }
                }
            }
        }
    }

    async fn process_batch(
        orchestrator: &SyncOrchestrator,
        queue: &Arc<dyn TaskQueue>,
        batch_size: usize,
    ) -> Result<BatchSummary> {
        let tasks = queue.due(batch_size, now_ts()).await?;
        let mut summary = BatchSummary { claimed: tasks.len(), ..BatchSummary::default() };

        for task in tasks {
            let report = orchestrator.run_task(&task).await;
            let recorded = match &report.result {
                TargetResult::Failed(err) => {
                    summary.failed += 1;
                    warn!(
                        task_id = %task.id,
                        target_id = %task.target_id,
                        item_id = task.item_id,
                        attempt = task.attempts,
                        error = %err,
                        "Deferred task failed"
                    );
                    queue.fail(&task.id, &err.ledger_message()).await
                }
                TargetResult::Synced { .. } | TargetResult::Scheduled { .. } => {
                    summary.completed += 1;
                    queue.complete(&task.id).await
                }
            };

            // The ledger row already reflects the outcome; a lost queue
            // update only means the sweeper sees the task again.
            if let Err(err) = recorded {
                warn!(task_id = %task.id, error = %err, "Failed to record task outcome");
            }
        }

        Ok(summary)
    }
}

impl Drop for DeferredSyncWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("DeferredSyncWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use relaypost_core::testing::{sample_item, TestEnv};
    use relaypost_core::{SyncError, SyncLedger};
    use relaypost_domain::{SyncKind, SyncStatus, SyncTask, TaskStatus};

    use super::*;

    fn task(id: &str, item_id: u64, target_id: &str) -> SyncTask {
        SyncTask {
            id: id.into(),
            item_id,
            target_id: target_id.into(),
            kind: SyncKind::Create,
            status: TaskStatus::Pending,
            run_at: 0,
            attempts: 0,
            last_error: None,
            created_at: 0,
        }
    }

    fn fast_config() -> DeferredWorkerConfig {
        DeferredWorkerConfig {
            batch_size: 10,
            poll_interval: Duration::from_millis(20),
        }
    }

    fn worker(env: &TestEnv) -> DeferredSyncWorker {
        DeferredSyncWorker::new(Arc::new(env.orchestrator()), env.queue.clone(), fast_config())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_marks_tasks_done_or_failed() {
        let env = TestEnv::new();
        env.add_target("a").await.unwrap();
        env.add_target("b").await.unwrap();
        env.content.insert_item(sample_item(1));
        env.remote.fail_posts("b", SyncError::server(500, "boom"));
        env.queue.enqueue(&task("t-a", 1, "a")).await.unwrap();
        env.queue.enqueue(&task("t-b", 1, "b")).await.unwrap();

        let summary = worker(&env).run_once().await.unwrap();

        assert_eq!(summary, BatchSummary { claimed: 2, completed: 1, failed: 1 });
        let tasks = env.queue.tasks();
        let status = |id: &str| tasks.iter().find(|t| t.id == id).unwrap().status;
        assert_eq!(status("t-a"), TaskStatus::Done);
        assert_eq!(status("t-b"), TaskStatus::Failed);
        let failed = tasks.iter().find(|t| t.id == "t-b").unwrap();
        assert!(failed.last_error.as_deref().unwrap().starts_with("server:"));
        assert_eq!(env.ledger.get("a", 1).await.unwrap().unwrap().status, SyncStatus::Success);
        assert_eq!(env.ledger.get("b", 1).await.unwrap().unwrap().status, SyncStatus::Failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_queue_is_a_quiet_tick() {
        let env = TestEnv::new();
        assert_eq!(worker(&env).run_once().await.unwrap(), BatchSummary::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn running_worker_drains_the_queue() {
        let env = TestEnv::new();
        env.add_target("a").await.unwrap();
        env.content.insert_item(sample_item(7));
        env.queue.enqueue(&task("t-1", 7, "a")).await.unwrap();

        let mut worker = worker(&env);
        worker.start().await.unwrap();
        assert!(matches!(worker.start().await, Err(SchedulerError::AlreadyRunning)));

        let deadline = Instant::now() + Duration::from_secs(2);
        while env.queue.tasks()[0].status != TaskStatus::Done && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        worker.stop().await.unwrap();
        assert!(!worker.is_running());
        assert_eq!(env.queue.tasks()[0].status, TaskStatus::Done);
        assert_eq!(env.remote.posts("a").len(), 1);
    }

    /// Validates a stop request never cuts off a claimed task.
    ///
    /// Assertions:
    /// - a stop issued while the remote is still answering waits for it
    /// - the task ends `done`, the ledger row `success`, one remote post
    #[tokio::test(flavor = "multi_thread")]
    async fn stop_drains_the_in_flight_batch() {
        let env = TestEnv::new();
        env.add_target("a").await.unwrap();
        env.content.insert_item(sample_item(3));
        env.remote.delay_posts(Duration::from_millis(400));
        env.queue.enqueue(&task("t-slow", 3, "a")).await.unwrap();

        let mut worker = worker(&env);
        worker.start().await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while env.remote.call_count("create_post") == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(env.remote.call_count("create_post"), 1);

        worker.stop().await.unwrap();

        assert_eq!(env.queue.tasks()[0].status, TaskStatus::Done);
        assert_eq!(env.ledger.get("a", 3).await.unwrap().unwrap().status, SyncStatus::Success);
        assert_eq!(env.remote.posts("a").len(), 1);
    }

    #[tokio::test]
    async fn stop_without_start_fails() {
        let env = TestEnv::new();
        assert!(matches!(worker(&env).stop().await, Err(SchedulerError::NotRunning)));
    }

    #[test]
    fn config_follows_settings() {
        let mut settings = Settings::default();
        settings.api_settings.batch_size = 25;
        settings.sync_settings.worker_poll_secs = 5;

        let config = DeferredWorkerConfig::from_settings(&settings);

        assert_eq!(config.batch_size, 25);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }
}
