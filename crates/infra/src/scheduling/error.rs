//! Scheduler error types

use relaypost_domain::RelayPostError;
use thiserror::Error;

use crate::errors::InfraError;

/// Lifecycle errors of the background worker and the ledger sweeper.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already running")]
    AlreadyRunning,

    #[error("Scheduler not running")]
    NotRunning,

    #[error("Failed to create scheduler: {0}")]
    CreationFailed(String),

    #[error("Failed to start scheduler: {0}")]
    StartFailed(String),

    #[error("Failed to stop scheduler: {0}")]
    StopFailed(String),

    /// Usually an invalid cron expression.
    #[error("Failed to register job: {0}")]
    JobRegistrationFailed(String),

    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let relay_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                RelayPostError::InvalidInput(err.to_string())
            }
            SchedulerError::JobRegistrationFailed(_) => RelayPostError::Config(err.to_string()),
            _ => RelayPostError::Internal(err.to_string()),
        };
        InfraError(relay_err)
    }
}

impl From<SchedulerError> for RelayPostError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_misuse_is_invalid_input() {
        let err: RelayPostError = SchedulerError::AlreadyRunning.into();
        assert!(matches!(err, RelayPostError::InvalidInput(_)));
    }

    #[test]
    fn bad_cron_is_a_config_error() {
        let err: RelayPostError =
            SchedulerError::JobRegistrationFailed("invalid cron".into()).into();
        assert!(matches!(err, RelayPostError::Config(msg) if msg.contains("invalid cron")));
    }

    #[test]
    fn timeouts_report_seconds() {
        assert_eq!(
            SchedulerError::Timeout { seconds: 5 }.to_string(),
            "Operation timed out after 5s"
        );
    }
}
