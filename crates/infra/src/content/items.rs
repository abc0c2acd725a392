use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relaypost_core::ContentSource;
use relaypost_domain::{ContentItem, RelayPostError, Result, TaxonomyKind, TermRef};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Reads content snapshots written by the host system.
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, item_id: u64) -> PathBuf {
        self.root.join("items").join(format!("{item_id}.json"))
    }

    fn terms_path(&self, kind: TaxonomyKind) -> PathBuf {
        self.root.join("terms").join(format!("{}.json", kind.as_str()))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RelayPostError::Internal(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };
    serde_json::from_slice(&raw).map(Some).map_err(|e| {
        RelayPostError::InvalidInput(format!("malformed snapshot {}: {e}", path.display()))
    })
}

#[async_trait]
impl ContentSource for FsContentSource {
    async fn get_item(&self, item_id: u64) -> Result<ContentItem> {
        let path = self.item_path(item_id);
        debug!(item_id, path = %path.display(), "loading content item");

        let item: ContentItem = read_json(&path)
            .await?
            .ok_or_else(|| RelayPostError::NotFound(format!("content item {item_id}")))?;
        if item.id != item_id {
            return Err(RelayPostError::InvalidInput(format!(
                "snapshot {} holds item {}",
                path.display(),
                item.id
            )));
        }
        Ok(item)
    }

    async fn get_term(&self, kind: TaxonomyKind, term_id: u64) -> Result<Option<TermRef>> {
        let terms: Vec<TermRef> = read_json(&self.terms_path(kind)).await?.unwrap_or_default();
        Ok(terms.into_iter().find(|term| term.id == term_id))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, rel: &str, contents: &str) {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn loads_item_snapshot() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "items/42.json",
            r#"{ "id": 42, "title": "Hello", "slug": "hello", "status": "published",
                 "categories": [{ "id": 3, "name": "News", "slug": "news" }] }"#,
        );

        let item = FsContentSource::new(dir.path()).get_item(42).await.unwrap();

        assert_eq!(item.title, "Hello");
        assert_eq!(item.categories[0].slug, "news");
        assert!(item.tags.is_empty());
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = FsContentSource::new(dir.path()).get_item(7).await.unwrap_err();
        assert!(matches!(err, RelayPostError::NotFound(_)));
    }

    #[tokio::test]
    async fn mismatched_or_malformed_snapshots_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "items/1.json", r#"{ "id": 2, "title": "t", "slug": "t" }"#);
        write(&dir, "items/3.json", "{ not json");
        let source = FsContentSource::new(dir.path());

        assert!(matches!(source.get_item(1).await, Err(RelayPostError::InvalidInput(_))));
        assert!(matches!(source.get_item(3).await, Err(RelayPostError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn terms_are_looked_up_per_taxonomy() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "terms/category.json",
            r#"[{ "id": 1, "name": "Parent", "slug": "parent" },
                { "id": 2, "name": "Child", "slug": "child", "parent": 1 }]"#,
        );
        let source = FsContentSource::new(dir.path());

        let child = source.get_term(TaxonomyKind::Category, 2).await.unwrap().unwrap();
        assert_eq!(child.parent, Some(1));
        assert!(source.get_term(TaxonomyKind::Category, 9).await.unwrap().is_none());
        assert!(source.get_term(TaxonomyKind::Tag, 1).await.unwrap().is_none());
    }
}
