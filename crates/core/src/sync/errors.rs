//! Sync-specific error types
//!
//! Every per-target failure is classified into one of these variants before
//! it reaches the ledger or the caller's report.

use std::time::Duration;

use relaypost_domain::RelayPostError;
use thiserror::Error;

/// Categories of sync errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Target unreachable or timed out - retryable
    Network,
    /// 401/403 - not retried
    Authentication,
    /// 429 - retryable once the window closes
    RateLimit,
    /// 5xx - retryable with the server-error multiplier
    Server,
    /// Other 4xx or local validation - terminal
    Client,
    /// Remote accepted the write but no id could be recovered - terminal
    Ambiguous,
    /// Local ledger/storage failures
    Storage,
    /// Missing configuration or cancelled work
    Config,
    /// Bugs and panicked workers
    Internal,
}

/// Sync operation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {message}")]
    RateLimited { message: String, retry_after: Option<Duration> },

    #[error("Server error: {message}")]
    Server { status: Option<u16>, message: String },

    #[error("Validation error: {message}")]
    Validation { status: Option<u16>, message: String },

    #[error("Ambiguous response: {0}")]
    AmbiguousResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Client error with the HTTP status that produced it.
    pub fn validation(status: u16, message: impl Into<String>) -> Self {
        Self::Validation { status: Some(status), message: message.into() }
    }

    /// Server error with the HTTP status that produced it.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status: Some(status), message: message.into() }
    }

    /// Get the error category for this error
    pub fn category(&self) -> SyncErrorCategory {
        match self {
            Self::Connectivity(_) => SyncErrorCategory::Network,
            Self::Authentication(_) => SyncErrorCategory::Authentication,
            Self::RateLimited { .. } => SyncErrorCategory::RateLimit,
            Self::Server { .. } => SyncErrorCategory::Server,
            Self::Validation { .. } | Self::NotFound(_) => SyncErrorCategory::Client,
            Self::AmbiguousResponse(_) => SyncErrorCategory::Ambiguous,
            Self::Storage(_) => SyncErrorCategory::Storage,
            Self::Config(_) | Self::Cancelled => SyncErrorCategory::Config,
            Self::Internal(_) => SyncErrorCategory::Internal,
        }
    }

    /// Check if the HTTP layer should retry this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            SyncErrorCategory::Network | SyncErrorCategory::RateLimit | SyncErrorCategory::Server
        )
    }

    /// True for a remote 404, used to detect posts deleted out from under us.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, Self::Validation { status: Some(404), .. })
    }

    /// Stable label persisted next to the error text and shown in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::Authentication(_) => "authentication",
            Self::RateLimited { .. } => "rate_limit",
            Self::Server { .. } => "server",
            Self::Validation { .. } => "validation",
            Self::AmbiguousResponse(_) => "ambiguous_response",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// `kind: message`, the form written to `last_error`.
    pub fn ledger_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

/// Convert from RelayPostError to SyncError
impl From<RelayPostError> for SyncError {
    fn from(err: RelayPostError) -> Self {
        match err {
            RelayPostError::Database(message) => Self::Storage(message),
            RelayPostError::Internal(message) => Self::Internal(message),
            RelayPostError::Config(message) => Self::Config(message),
            RelayPostError::Network(message) => Self::Connectivity(message),
            RelayPostError::Auth(message) | RelayPostError::Security(message) => {
                Self::Authentication(message)
            }
            RelayPostError::NotFound(message) => Self::NotFound(message),
            RelayPostError::InvalidInput(message) => Self::Validation { status: None, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(SyncError::Connectivity("x".into()).category(), SyncErrorCategory::Network);
        assert_eq!(
            SyncError::Authentication("x".into()).category(),
            SyncErrorCategory::Authentication
        );
        assert_eq!(SyncError::server(503, "x").category(), SyncErrorCategory::Server);
        assert_eq!(SyncError::validation(400, "x").category(), SyncErrorCategory::Client);
        assert_eq!(
            SyncError::AmbiguousResponse("x".into()).category(),
            SyncErrorCategory::Ambiguous
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(SyncError::Connectivity("x".into()).is_retryable());
        assert!(SyncError::server(500, "x").is_retryable());
        assert!(SyncError::RateLimited { message: "x".into(), retry_after: None }.is_retryable());
        assert!(!SyncError::validation(400, "x").is_retryable());
        assert!(!SyncError::Authentication("x".into()).is_retryable());
        assert!(!SyncError::AmbiguousResponse("x".into()).is_retryable());
    }

    #[test]
    fn remote_not_found_requires_404_status() {
        assert!(SyncError::validation(404, "gone").is_remote_not_found());
        assert!(!SyncError::validation(400, "bad").is_remote_not_found());
        assert!(!SyncError::NotFound("local".into()).is_remote_not_found());
    }

    #[test]
    fn domain_errors_map_to_sync_errors() {
        assert_eq!(
            SyncError::from(RelayPostError::Database("locked".into())),
            SyncError::Storage("locked".into())
        );
        assert!(matches!(
            SyncError::from(RelayPostError::InvalidInput("bad".into())),
            SyncError::Validation { status: None, .. }
        ));
    }

    #[test]
    fn ledger_message_is_prefixed_with_kind() {
        let err = SyncError::Connectivity("connection refused".into());
        assert_eq!(err.ledger_message(), "connectivity: Connectivity error: connection refused");
    }
}
