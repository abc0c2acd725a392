//! Local content snapshots handed to the sync engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{RelayPostError, Result};

/// Publication state of a local content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
    Private,
}

crate::impl_domain_status_conversions!(ContentStatus {
    Draft => "draft",
    Scheduled => "scheduled",
    Published => "published",
    Private => "private",
});

impl ContentStatus {
    /// Status string understood by the remote content API.
    pub fn remote_status(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "future",
            Self::Published => "publish",
            Self::Private => "private",
        }
    }
}

/// Taxonomy a term belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyKind {
    Category,
    Tag,
}

crate::impl_domain_status_conversions!(TaxonomyKind {
    Category => "category",
    Tag => "tag",
});

impl TaxonomyKind {
    /// Collection path segment on the remote API.
    pub fn rest_base(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Tag => "tags",
        }
    }

    /// Only categories form hierarchies.
    pub fn is_hierarchical(self) -> bool {
        matches!(self, Self::Category)
    }
}

/// Reference to a local taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermRef {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reference to a local media asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: u64,
    pub source_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
}

impl MediaRef {
    /// Last path segment of the source URL, without query or fragment.
    pub fn file_name(&self) -> String {
        let without_query =
            self.source_url.split(['?', '#']).next().unwrap_or(self.source_url.as_str());
        without_query
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .map_or_else(|| format!("media-{}", self.id), str::to_string)
    }

    /// File name without its extension.
    pub fn file_stem(&self) -> String {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Read-only snapshot of the local unit being replicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub slug: String,
    #[serde(default)]
    pub categories: Vec<TermRef>,
    #[serde(default)]
    pub tags: Vec<TermRef>,
    #[serde(default)]
    pub featured_media: Option<MediaRef>,
    /// Media embedded in the body, matched against `<img>` sources.
    #[serde(default)]
    pub attachments: Vec<MediaRef>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ContentItem {
    /// Check the invariants the engine relies on before any remote call.
    pub fn validate(&self) -> Result<()> {
        if self.id == 0 {
            return Err(RelayPostError::InvalidInput("content item id must be non-zero".into()));
        }
        if self.slug.trim().is_empty() {
            return Err(RelayPostError::InvalidInput(format!(
                "content item {} has an empty slug",
                self.id
            )));
        }
        Ok(())
    }

    /// Terms of the requested taxonomy.
    pub fn terms(&self, kind: TaxonomyKind) -> &[TermRef] {
        match kind {
            TaxonomyKind::Category => &self.categories,
            TaxonomyKind::Tag => &self.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(url: &str) -> MediaRef {
        MediaRef { id: 7, source_url: url.into(), title: None, alt_text: None }
    }

    #[test]
    fn media_file_name_strips_query() {
        let m = media("https://cdn.example.com/uploads/2024/06/Hero.PNG?ver=3");
        assert_eq!(m.file_name(), "Hero.PNG");
        assert_eq!(m.file_stem(), "Hero");
        assert_eq!(m.extension().as_deref(), Some("png"));
    }

    #[test]
    fn media_without_path_falls_back_to_id() {
        let m = media("https://cdn.example.com/");
        assert_eq!(m.file_name(), "cdn.example.com");
        let bare = media("");
        assert_eq!(bare.file_name(), "media-7");
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn validate_rejects_zero_id_and_empty_slug() {
        let mut item: ContentItem =
            serde_json::from_str(r#"{ "id": 0, "title": "t", "slug": "t" }"#).unwrap();
        assert!(item.validate().is_err());
        item.id = 3;
        assert!(item.validate().is_ok());
        item.slug = "  ".into();
        assert!(item.validate().is_err());
    }

    #[test]
    fn scheduled_maps_to_future() {
        assert_eq!(ContentStatus::Scheduled.remote_status(), "future");
        assert_eq!("Published".parse::<ContentStatus>().unwrap(), ContentStatus::Published);
    }
}
