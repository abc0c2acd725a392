//! Local storage
//!
//! Pooled SQLite connections shared by the ledger repositories.

pub mod error;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use sqlite::{SqliteConnection, SqlitePool, SqlitePoolConfig};
