//! Background execution: the deferred sync worker and the cron-driven
//! ledger sweeper.
//!
//! Both follow the same runtime rules:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on all async operations

pub mod deferred_worker;
pub mod error;
pub mod ledger_sweeper;

pub use deferred_worker::{BatchSummary, DeferredSyncWorker, DeferredWorkerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use ledger_sweeper::{LedgerSweeper, LedgerSweeperConfig};
