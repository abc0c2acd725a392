//! Conversions from external infrastructure errors into domain errors.

use keyring::Error as KeyringError;
use relaypost_common::storage::StorageError;
use relaypost_domain::RelayPostError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub RelayPostError);

impl From<InfraError> for RelayPostError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<RelayPostError> for InfraError {
    fn from(value: RelayPostError) -> Self {
        InfraError(value)
    }
}

trait IntoRelayPostError {
    fn into_relaypost(self) -> RelayPostError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → RelayPostError */
/* -------------------------------------------------------------------------- */

impl IntoRelayPostError for SqlError {
    fn into_relaypost(self) -> RelayPostError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        RelayPostError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        RelayPostError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        RelayPostError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        RelayPostError::Database("foreign key constraint violation".into())
                    }
                    _ => RelayPostError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => RelayPostError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                RelayPostError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                RelayPostError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => RelayPostError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => RelayPostError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_relaypost())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → RelayPostError */
/* -------------------------------------------------------------------------- */

impl IntoRelayPostError for StorageError {
    fn into_relaypost(self) -> RelayPostError {
        match self {
            StorageError::Rusqlite(err) => err.into_relaypost(),
            StorageError::InvalidConfig(message) => RelayPostError::Config(message),
            other => RelayPostError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_relaypost())
    }
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → RelayPostError */
/* -------------------------------------------------------------------------- */

impl IntoRelayPostError for KeyringError {
    fn into_relaypost(self) -> RelayPostError {
        use KeyringError::*;

        let description = self.to_string();

        match self {
            NoEntry => RelayPostError::NotFound("keychain entry not found".into()),
            BadEncoding(_) => {
                RelayPostError::Security("credential in keychain is not valid UTF-8".into())
            }
            TooLong(name, limit) => RelayPostError::Security(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Invalid(attr, reason) => {
                RelayPostError::Security(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            Ambiguous(entries) => RelayPostError::Security(format!(
                "multiple keychain entries matched request ({} results)",
                entries.len()
            )),
            PlatformFailure(err) => {
                RelayPostError::Security(format!("keychain platform error: {err}"))
            }
            NoStorageAccess(err) => {
                RelayPostError::Security(format!("unable to access secure storage: {err}"))
            }
            _ => RelayPostError::Security(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_relaypost())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → RelayPostError */
/* -------------------------------------------------------------------------- */

impl IntoRelayPostError for HttpError {
    fn into_relaypost(self) -> RelayPostError {
        if self.is_timeout() {
            return RelayPostError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return RelayPostError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return RelayPostError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => RelayPostError::Auth(message),
                404 => RelayPostError::NotFound(message),
                400..=499 if code != 429 => RelayPostError::InvalidInput(message),
                _ => RelayPostError::Network(message),
            };
        }

        RelayPostError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_relaypost())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Validates `InfraError::from` for a busy SQLite failure.
    ///
    /// Assertions:
    /// - Ensures the mapped error is `RelayPostError::Database` mentioning "busy".
    #[test]
    fn sqlite_busy_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let mapped: RelayPostError = InfraError::from(err).into();
        match mapped {
            RelayPostError::Database(msg) => assert!(msg.contains("busy")),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    /// Validates `InfraError::from` for extended code 2067.
    ///
    /// Assertions:
    /// - Confirms `mapped` equals `Database("unique constraint violation")`.
    #[test]
    fn unique_violation_is_named() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::ConstraintViolation, extended_code: 2067 },
            None,
        );
        let mapped: RelayPostError = InfraError::from(err).into();
        assert_eq!(mapped, RelayPostError::Database("unique constraint violation".into()));
    }

    /// Validates `InfraError::from` for `StorageError::InvalidConfig`.
    ///
    /// Assertions:
    /// - Confirms `mapped` equals `RelayPostError::Config("pool size 0")`.
    #[test]
    fn storage_config_errors_stay_config_errors() {
        let mapped: RelayPostError =
            InfraError::from(StorageError::InvalidConfig("pool size 0".into())).into();
        assert_eq!(mapped, RelayPostError::Config("pool size 0".into()));
    }

    /// Validates `InfraError::from` for `KeyringError::NoEntry`.
    ///
    /// Assertions:
    /// - Ensures the mapped error is `NotFound` mentioning "keychain".
    #[test]
    fn keyring_no_entry_maps_to_not_found() {
        let mapped: RelayPostError = InfraError::from(KeyringError::NoEntry).into();
        match mapped {
            RelayPostError::NotFound(msg) => assert!(msg.contains("keychain")),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    /// Validates `InfraError::from` for a reqwest 401 status error.
    ///
    /// Assertions:
    /// - Ensures the mapped error is `RelayPostError::Auth` mentioning "401".
    #[tokio::test]
    async fn http_status_401_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: RelayPostError = InfraError::from(error).into();
        match mapped {
            RelayPostError::Auth(msg) => assert!(msg.contains("401")),
            other => panic!("expected auth error, got {other:?}"),
        }
    }
}
