//! # RelayPost Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for remote APIs, ledgers and sources
//! - The sync engine: response interpretation, taxonomy and media
//!   resolution, the per-target pipeline and the orchestrator
//! - Target administration and ledger maintenance services
//!
//! ## Architecture Principles
//! - Only depends on `relaypost-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod sync;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use sync::errors::{SyncError, SyncErrorCategory};
pub use sync::interpreter::ResponseInterpreter;
pub use sync::maintenance::{LedgerMaintenance, SweepReport};
pub use sync::media::MediaSynchronizer;
pub use sync::orchestrator::{
    OrchestratorError, RetrySummary, SyncOrchestrator, TargetSelection,
};
pub use sync::payload::PostPayload;
pub use sync::pipeline::TargetPipeline;
pub use sync::ports::*;
pub use sync::report::{SyncOutcome, SyncReport, TargetReport, TargetResult};
pub use sync::targets::TargetRegistry;
pub use sync::taxonomy::{TaxonomyResolver, TermResolution};
