//! Application constants
//!
//! Domain-level constants shared by the ledger, the sync engine and the
//! maintenance jobs.

// Ledger maintenance
pub const STUCK_RECORD_TIMEOUT_SECS: i64 = 600;
pub const MEDIA_SUCCESS_TTL_SECS: i64 = 30 * 24 * 60 * 60;
pub const STUCK_SYNC_MARKER: &str = "timeout: record stuck in syncing";
pub const STUCK_UPLOAD_MARKER: &str = "timeout: record stuck in uploading";

// Error persistence
pub const MAX_ERROR_LENGTH: usize = 512;
pub const ERROR_TRUNCATE_SUFFIX: &str = "...";

// Taxonomy resolution
pub const TERM_CACHE_TTL_SECS: u64 = 3600;
pub const MAX_TERM_PARENT_DEPTH: usize = 16;

// Secrets
pub const CREDENTIAL_SERVICE_NAME: &str = "dev.relaypost.targets";
pub const CREDENTIAL_FIELD: &str = "app_password";

/// Truncate an error message to the length the ledger persists.
pub fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LENGTH {
        return message.to_string();
    }
    let mut cut = MAX_ERROR_LENGTH - ERROR_TRUNCATE_SUFFIX.len();
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &message[..cut], ERROR_TRUNCATE_SUFFIX)
}
