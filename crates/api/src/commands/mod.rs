//! CLI command handlers.
//!
//! Handlers return typed results; rendering to text is kept separate so the
//! binary decides what reaches stdout.

pub mod stats;
pub mod sync;
pub mod targets;
pub mod worker;

pub use stats::{render_stats, sync_stats};
pub use sync::{delete_item, render_report, retry_failed, selection, sync_item};
pub use targets::{add_target, deactivate_target, list_targets, remove_target, render_targets};
pub use worker::run_worker;
