//! Dispatch selection for fanning work across targets.

use serde::{Deserialize, Serialize};

/// How a sync request is spread over its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One target after another, in the order given.
    #[default]
    Serial,
    /// One worker per target, results interpreted afterwards.
    Parallel,
    /// Persist task descriptors and return immediately.
    Deferred,
}

crate::impl_domain_status_conversions!(DispatchMode {
    Serial => "serial",
    Parallel => "parallel",
    Deferred => "deferred",
});
