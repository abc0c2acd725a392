//! Post payload preparation and inline image handling.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use relaypost_domain::{ContentItem, MediaRef};
use serde::Serialize;

#[allow(clippy::expect_used)]
static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*(?:"([^"]+)"|'([^']+)')"#)
        .expect("IMG_SRC should compile - this is a bug")
});

/// JSON body sent to the remote posts endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostPayload {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub status: String,
    pub slug: String,
    /// Publish time in UTC, `YYYY-MM-DDTHH:MM:SS`.
    #[serde(rename = "date_gmt", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub categories: Vec<u64>,
    pub tags: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl PostPayload {
    /// Build the payload for `item` from ids already resolved on the target.
    pub fn from_item(
        item: &ContentItem,
        content: String,
        categories: Vec<u64>,
        tags: Vec<u64>,
        featured_media: Option<u64>,
    ) -> Self {
        Self {
            title: item.title.clone(),
            content,
            excerpt: item.excerpt.clone(),
            status: item.status.remote_status().to_string(),
            slug: item.slug.clone(),
            date: item.published_at.map(|at| at.format("%Y-%m-%dT%H:%M:%S").to_string()),
            categories,
            tags,
            featured_media,
            meta: item.metadata.clone(),
        }
    }
}

/// Image sources referenced by `<img>` tags, in order of first appearance.
pub fn extract_image_urls(body: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for captures in IMG_SRC.captures_iter(body) {
        let Some(src) = captures.get(1).or_else(|| captures.get(2)) else {
            continue;
        };
        let src = src.as_str().trim();
        if !src.is_empty() && !urls.iter().any(|seen| seen == src) {
            urls.push(src.to_string());
        }
    }
    urls
}

/// Attachments of `item` that are actually embedded in its body.
pub fn inline_media(item: &ContentItem) -> Vec<MediaRef> {
    let urls = extract_image_urls(&item.body);
    item.attachments
        .iter()
        .filter(|media| urls.iter().any(|url| url == &media.source_url))
        .cloned()
        .collect()
}

/// Replace each local URL with its remote counterpart.
pub fn rewrite_body(body: &str, replacements: &[(String, String)]) -> String {
    replacements
        .iter()
        .filter(|(local, remote)| !local.is_empty() && !remote.is_empty() && local != remote)
        .fold(body.to_string(), |acc, (local, remote)| acc.replace(local.as_str(), remote))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use relaypost_domain::ContentStatus;

    use super::*;

    fn item(body: &str) -> ContentItem {
        serde_json::from_value(serde_json::json!({
            "id": 12,
            "title": "Launch notes",
            "slug": "launch-notes",
            "body": body,
            "attachments": [
                { "id": 1, "source_url": "https://local.test/a.png" },
                { "id": 2, "source_url": "https://local.test/unused.jpg" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn extracts_quoted_sources_once() {
        let body = r#"<p><img class="x" src="https://local.test/a.png"></p>
            <IMG alt='b' SRC='https://local.test/b.jpg' />
            <img src="https://local.test/a.png">"#;
        assert_eq!(
            extract_image_urls(body),
            vec!["https://local.test/a.png".to_string(), "https://local.test/b.jpg".to_string()]
        );
    }

    #[test]
    fn ignores_non_image_tags() {
        assert!(extract_image_urls(r#"<script src="x.js"></script>"#).is_empty());
    }

    #[test]
    fn inline_media_only_returns_embedded_attachments() {
        let item = item(r#"<img src="https://local.test/a.png">"#);
        let embedded = inline_media(&item);
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].id, 1);
    }

    #[test]
    fn rewrite_replaces_every_occurrence() {
        let body = r#"<img src="https://local.test/a.png"><a href="https://local.test/a.png">"#;
        let rewritten = rewrite_body(
            body,
            &[("https://local.test/a.png".into(), "https://remote.test/a.png".into())],
        );
        assert!(!rewritten.contains("local.test"));
        assert_eq!(rewritten.matches("remote.test").count(), 2);
    }

    #[test]
    fn payload_maps_status_and_date() {
        let mut item = item("");
        item.status = ContentStatus::Scheduled;
        item.published_at = Some(chrono::Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap());

        let payload = PostPayload::from_item(&item, "body".into(), vec![3], vec![], Some(8));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "future");
        assert_eq!(json["date_gmt"], "2024-06-01T09:30:00");
        assert_eq!(json["featured_media"], 8);
        assert!(json.get("excerpt").is_none());
        assert!(json.get("meta").is_none());
    }
}
