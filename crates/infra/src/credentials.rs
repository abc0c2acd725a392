//! Target secrets held in the system keyring.
//!
//! Each target's application password lives in one keyring entry under the
//! [`CREDENTIAL_SERVICE_NAME`] service, keyed by target id.

use std::collections::HashMap;

use async_trait::async_trait;
use keyring::Entry;
use parking_lot::RwLock;
use relaypost_core::CredentialStore;
use relaypost_domain::constants::{CREDENTIAL_FIELD, CREDENTIAL_SERVICE_NAME};
use relaypost_domain::{RelayPostError, Result};
use tokio::task;
use tracing::debug;

use crate::database::manager::map_join_error;
use crate::errors::InfraError;

/// Keyring-backed [`CredentialStore`].
pub struct KeyringCredentialStore {
    service_name: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(CREDENTIAL_SERVICE_NAME)
    }

    /// Use a different keyring service, e.g. to keep test runs apart.
    pub fn with_service(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    fn entry(service: &str, target_id: &str) -> Result<Entry> {
        Entry::new(service, &format!("{target_id}.{CREDENTIAL_FIELD}"))
            .map_err(|e| RelayPostError::from(InfraError::from(e)))
    }

    async fn with_entry<T, F>(&self, target_id: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T> + Send + 'static,
    {
        let service = self.service_name.clone();
        let target_id = target_id.to_string();
        task::spawn_blocking(move || f(Self::entry(&service, &target_id)?))
            .await
            .map_err(map_join_error)?
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn secret(&self, target_id: &str) -> Result<Option<String>> {
        debug!(service = %self.service_name, target_id, "reading target secret");
        self.with_entry(target_id, |entry| match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(InfraError::from(e).into()),
        })
        .await
    }

    async fn store(&self, target_id: &str, secret: &str) -> Result<()> {
        debug!(service = %self.service_name, target_id, "storing target secret");
        let secret = secret.to_string();
        self.with_entry(target_id, move |entry| {
            entry.set_password(&secret).map_err(|e| InfraError::from(e).into())
        })
        .await
    }

    /// Idempotent: a missing entry is not an error.
    async fn remove(&self, target_id: &str) -> Result<()> {
        debug!(service = %self.service_name, target_id, "removing target secret");
        self.with_entry(target_id, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(InfraError::from(e).into()),
        })
        .await
    }
}

/// In-process [`CredentialStore`] for hosts without a keyring and for
/// secrets supplied through the environment.
#[derive(Default)]
pub struct StaticCredentialStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, target_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.write().insert(target_id.into(), secret.into());
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn secret(&self, target_id: &str) -> Result<Option<String>> {
        Ok(self.secrets.read().get(target_id).cloned())
    }

    async fn store(&self, target_id: &str, secret: &str) -> Result<()> {
        self.secrets.write().insert(target_id.to_string(), secret.to_string());
        Ok(())
    }

    async fn remove(&self, target_id: &str) -> Result<()> {
        self.secrets.write().remove(target_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyring_store() -> KeyringCredentialStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringCredentialStore::with_service("dev.relaypost.tests")
    }

    #[tokio::test]
    async fn missing_keyring_entry_reads_as_none() {
        let store = keyring_store();
        assert_eq!(store.secret("target-unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn removing_missing_keyring_entry_is_ok() {
        let store = keyring_store();
        store.remove("target-unknown").await.unwrap();
    }

    #[tokio::test]
    async fn static_store_round_trip() {
        let store = StaticCredentialStore::new().with_secret("a", "pass a");
        store.store("b", "pass b").await.unwrap();

        assert_eq!(store.secret("a").await.unwrap().as_deref(), Some("pass a"));
        assert_eq!(store.secret("b").await.unwrap().as_deref(), Some("pass b"));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.secret("a").await.unwrap(), None);
    }
}
