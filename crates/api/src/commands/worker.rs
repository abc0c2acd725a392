//! Long-running background mode: deferred worker plus ledger sweeper.

use std::future::Future;
use std::sync::Arc;

use relaypost_domain::Result;
use relaypost_infra::{DeferredSyncWorker, DeferredWorkerConfig, LedgerSweeper, WorkerLock};
use tracing::{info, warn};

use crate::AppContext;

/// Run until `shutdown` resolves, then stop both schedulers.
///
/// Holds the per-database worker lock for the whole run so two processes
/// never drain the same queue.
pub async fn run_worker<F>(ctx: &AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let _lock = WorkerLock::acquire(ctx.db.path())?;
    let settings = ctx.current_settings();

    let mut worker = DeferredSyncWorker::new(
        Arc::clone(&ctx.orchestrator),
        ctx.queue.clone(),
        DeferredWorkerConfig::from_settings(&settings),
    );
    let mut sweeper = LedgerSweeper::new(&settings.sweeper, Arc::clone(&ctx.maintenance)).await?;

    worker.start().await?;
    if let Err(err) = sweeper.start().await {
        if let Err(stop_err) = worker.stop().await {
            warn!(error = %stop_err, "failed to stop deferred worker");
        }
        return Err(err.into());
    }
    info!(
        batch_size = settings.api_settings.batch_size,
        poll_secs = settings.sync_settings.worker_poll_secs,
        cron = %settings.sweeper.cron_expression,
        "worker running"
    );

    shutdown.await;
    info!("shutdown requested, stopping worker");

    if let Err(err) = worker.stop().await {
        warn!(error = %err, "failed to stop deferred worker");
    }
    if let Err(err) = sweeper.stop().await {
        warn!(error = %err, "failed to stop ledger sweeper");
    }
    Ok(())
}
