//! Remote endpoints content is synchronised to.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::now_ts;
use crate::errors::{RelayPostError, Result};

/// A remote endpoint exposing the REST content API.
///
/// The secret half of the credential pair is held by the credential store
/// under the target id; only the username lives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Target {
    /// Create an active target with a fresh UUIDv7 identifier.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let now = now_ts();
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            base_url,
            username: username.into(),
            active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Trim whitespace and trailing slashes; require an http(s) scheme.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(RelayPostError::InvalidInput(format!(
            "target url must start with http:// or https://: {raw}"
        )));
    }
    if trimmed.len() <= "https://".len() {
        return Err(RelayPostError::InvalidInput(format!("target url has no host: {raw}")));
    }
    Ok(trimmed.to_string())
}

/// Username/secret pair supplied by the credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub app_password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_target_is_active_with_normalized_url() {
        let target = Target::new("blog", " https://example.com/ ", "editor").unwrap();
        assert!(target.active);
        assert_eq!(target.base_url, "https://example.com");
        assert!(!target.id.is_empty());
    }

    #[test]
    fn rejects_urls_without_scheme() {
        assert!(matches!(
            Target::new("blog", "example.com", "editor"),
            Err(RelayPostError::InvalidInput(_))
        ));
        assert!(normalize_base_url("https://").is_err());
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials { username: "u".into(), app_password: "hunter2".into() };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
