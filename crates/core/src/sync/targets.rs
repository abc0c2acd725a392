//! Target administration.

use std::sync::Arc;

use relaypost_domain::{RelayPostError, Result, Target};
use tracing::{info, instrument, warn};

use super::ports::{CredentialStore, TargetRepository, TermMappingStore};

/// Registers targets together with their secrets and tears both down.
pub struct TargetRegistry {
    repo: Arc<dyn TargetRepository>,
    credentials: Arc<dyn CredentialStore>,
    mappings: Arc<dyn TermMappingStore>,
}

impl TargetRegistry {
    pub fn new(
        repo: Arc<dyn TargetRepository>,
        credentials: Arc<dyn CredentialStore>,
        mappings: Arc<dyn TermMappingStore>,
    ) -> Self {
        Self { repo, credentials, mappings }
    }

    /// Create an active target and store its secret under the new id.
    #[instrument(skip(self, secret))]
    pub async fn add(
        &self,
        name: &str,
        base_url: &str,
        username: &str,
        secret: &str,
    ) -> Result<Target> {
        if name.trim().is_empty() || username.trim().is_empty() {
            return Err(RelayPostError::InvalidInput("target name and username are required".into()));
        }
        if secret.is_empty() {
            return Err(RelayPostError::InvalidInput("target secret is required".into()));
        }

        let target = Target::new(name.trim(), base_url, username.trim())?;
        self.credentials.store(&target.id, secret).await?;
        if let Err(err) = self.repo.save(&target).await {
            if let Err(cleanup) = self.credentials.remove(&target.id).await {
                warn!(target_id = %target.id, error = %cleanup, "failed to remove orphaned secret");
            }
            return Err(err);
        }

        info!(target_id = %target.id, base_url = %target.base_url, "target added");
        Ok(target)
    }

    pub async fn get(&self, target_id: &str) -> Result<Target> {
        self.repo
            .get(target_id)
            .await?
            .ok_or_else(|| RelayPostError::NotFound(format!("target {target_id}")))
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Target>> {
        self.repo.list(active_only).await
    }

    /// Soft delete: the target is never selected again but its ledger rows
    /// stay.
    pub async fn deactivate(&self, target_id: &str) -> Result<()> {
        self.repo.deactivate(target_id).await?;
        info!(target_id, "target deactivated");
        Ok(())
    }

    /// Hard delete of the target, its secret and its term mappings.
    #[instrument(skip(self))]
    pub async fn remove(&self, target_id: &str) -> Result<()> {
        self.repo.delete(target_id).await?;
        let mappings = self.mappings.remove_for_target(target_id).await?;
        if let Err(err) = self.credentials.remove(target_id).await {
            warn!(target_id, error = %err, "failed to remove target secret");
        }
        info!(target_id, mappings, "target removed");
        Ok(())
    }
}
