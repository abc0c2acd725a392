//! # RelayPost Infrastructure
//!
//! Infrastructure implementations of the `relaypost-core` ports.
//!
//! This crate contains:
//! - The HTTP execution layer and the REST remote client (reqwest)
//! - SQLite ledgers, target registry, term mappings and the task queue
//! - Configuration loading and the keyring credential store
//! - Filesystem content/media sources and image optimisation
//! - The deferred sync worker and the ledger sweeper
//!
//! ## Architecture
//! - Implements traits defined in `relaypost-core`
//! - Depends on `relaypost-common` and `relaypost-domain`
//! - Contains all "impure" code (I/O, network, keyring)

pub mod config;
pub mod content;
pub mod credentials;
pub mod database;
pub mod errors;
pub mod http;
pub mod media;
pub mod scheduling;
pub mod worker_lock;

// Re-export commonly used items
pub use config::SharedSettings;
pub use content::{FsContentSource, FsMediaSource};
pub use credentials::{KeyringCredentialStore, StaticCredentialStore};
pub use database::*;
pub use errors::InfraError;
pub use http::{HttpClient, RestClientConfig, RestRemoteClient};
pub use media::ImageOptimizer;
pub use scheduling::{
    DeferredSyncWorker, DeferredWorkerConfig, LedgerSweeper, LedgerSweeperConfig, SchedulerError,
};
pub use worker_lock::WorkerLock;
