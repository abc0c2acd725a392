//! Cron-driven ledger maintenance.
//!
//! Runs [`LedgerMaintenance::sweep`] on a cron schedule: records stuck in
//! `syncing`/`uploading` are failed with a timeout marker, abandoned deferred
//! tasks go back to the queue and old successful media rows are purged.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relaypost_core::LedgerMaintenance;
//! use relaypost_domain::SweeperSettings;
//! use relaypost_infra::scheduling::{LedgerSweeper, LedgerSweeperConfig, SchedulerResult};
//!
//! # async fn example(maintenance: Arc<LedgerMaintenance>) -> SchedulerResult<()> {
//! let config = LedgerSweeperConfig::from_settings(&SweeperSettings::default());
//! let mut sweeper = LedgerSweeper::with_config(config, maintenance).await?;
//!
//! sweeper.start().await?;
//! // ... application runs ...
//! sweeper.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use relaypost_core::{LedgerMaintenance, SweepReport};
use relaypost_domain::{now_ts, Result, SweeperSettings};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the ledger sweeper.
#[derive(Debug, Clone)]
pub struct LedgerSweeperConfig {
    /// Cron expression describing the execution schedule (with seconds).
    pub cron_expression: String,
    /// Age after which `syncing`/`uploading` rows count as stuck.
    pub stuck_after_secs: i64,
    /// Age after which successful media rows are purged.
    pub media_success_ttl_secs: i64,
    /// Timeout applied to a single sweep.
    pub job_timeout: Duration,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for LedgerSweeperConfig {
    fn default() -> Self {
        Self::from_settings(&SweeperSettings::default())
    }
}

impl LedgerSweeperConfig {
    pub fn from_settings(settings: &SweeperSettings) -> Self {
        Self {
            cron_expression: settings.cron_expression.clone(),
            stuck_after_secs: settings.stuck_after_secs,
            media_success_ttl_secs: settings.media_success_ttl_secs,
            job_timeout: Duration::from_secs(60),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Ledger sweeper with explicit lifecycle management.
pub struct LedgerSweeper {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: LedgerSweeperConfig,
    job_id: Uuid,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    maintenance: Arc<LedgerMaintenance>,
}

impl LedgerSweeper {
    /// Create a sweeper using the default timeouts.
    pub async fn new(
        settings: &SweeperSettings,
        maintenance: Arc<LedgerMaintenance>,
    ) -> SchedulerResult<Self> {
        Self::with_config(LedgerSweeperConfig::from_settings(settings), maintenance).await
    }

    /// Create a sweeper and register its job. Fails on an invalid cron
    /// expression.
    pub async fn with_config(
        config: LedgerSweeperConfig,
        maintenance: Arc<LedgerMaintenance>,
    ) -> SchedulerResult<Self> {
        let raw_scheduler =
            JobScheduler::new().await.map_err(|e| SchedulerError::CreationFailed(e.to_string()))?;

        let mut sweeper = Self {
            scheduler: Arc::new(RwLock::new(raw_scheduler)),
            config,
            job_id: Uuid::nil(),
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            maintenance,
        };

        sweeper.job_id = sweeper.register_sweep_job().await?;
        Ok(sweeper)
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler = self.scheduler.clone();
        let start_timeout = self.config.start_timeout;
        tokio::time::timeout(start_timeout, async move {
            let guard = scheduler.write().await;
            guard.start().await
        })
        .await
        .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?
        .map_err(|e| SchedulerError::StartFailed(e.to_string()))?;

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("Ledger sweeper monitor cancelled");
        });

        self.monitor_handle = Some(handle);
        info!(cron = %self.config.cron_expression, "Ledger sweeper started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let scheduler = self.scheduler.clone();
        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move {
            let mut guard = scheduler.write().await;
            guard.shutdown().await
        })
        .await
        .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?
        .map_err(|e| SchedulerError::StopFailed(e.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Ledger sweeper stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when the monitor task is active.
    pub fn is_running(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Sweep immediately, outside the schedule.
    pub async fn run_once(&self) -> Result<SweepReport> {
        self.maintenance
            .sweep(now_ts(), self.config.stuck_after_secs, self.config.media_success_ttl_secs)
            .await
    }

    async fn register_sweep_job(&mut self) -> SchedulerResult<Uuid> {
        if self.job_id != Uuid::nil() {
            return Ok(self.job_id);
        }

        let maintenance = self.maintenance.clone();
        let job_timeout = self.config.job_timeout;
        let stuck_after = self.config.stuck_after_secs;
        let media_ttl = self.config.media_success_ttl_secs;

        let job_definition =
            Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
                let maintenance = maintenance.clone();

                Box::pin(async move {
                    let started = Instant::now();
                    let sweep = maintenance.sweep(now_ts(), stuck_after, media_ttl);

                    match tokio::time::timeout(job_timeout, sweep).await {
                        Ok(Ok(report)) => {
                            debug!(
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                requeued_tasks = report.requeued_tasks,
                                "Ledger sweep finished"
                            );
                        }
                        Ok(Err(err)) => error!(error = %err, "Ledger sweep failed"),
                        Err(_) => {
                            warn!(timeout_secs = job_timeout.as_secs(), "Ledger sweep timed out");
                        }
                    }
                })
            })
            .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        let job_id = job_definition.guid();
        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job_definition)
            .await
            .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered ledger sweep job");
        Ok(job_id)
    }
}

impl Drop for LedgerSweeper {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("LedgerSweeper dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
