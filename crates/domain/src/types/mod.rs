//! Domain types and models

pub mod content;
pub mod dispatch;
pub mod ledger;
pub mod target;

pub use content::*;
pub use dispatch::*;
pub use ledger::*;
pub use target::*;

/// Current unix timestamp in seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
