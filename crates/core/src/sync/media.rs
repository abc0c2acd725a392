//! Media replication
//!
//! Ensures a remote copy of a local asset exists on one target and records
//! progress in the media ledger: `pending -> uploading -> success|failed`.

use std::sync::Arc;

use relaypost_domain::{MediaRef, MediaSyncRecord, MediaSyncStatus};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::errors::SyncError;
use super::ports::{
    AssetOptimizer, MediaLedger, MediaSource, MediaUpload, RawResponse, RemoteClient,
    RemoteTarget,
};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// MIME type for a lowercased file extension.
pub fn content_type_for(extension: Option<&str>) -> &'static str {
    match extension {
        Some("jpg" | "jpeg" | "jpe") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("bmp") => "image/bmp",
        Some("ico") => "image/x-icon",
        Some("tif" | "tiff") => "image/tiff",
        Some("svg") => "image/svg+xml",
        Some("heic") => "image/heic",
        Some("pdf") => "application/pdf",
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    match value.get(key)? {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("rendered").and_then(Value::as_str),
        _ => None,
    }
}

/// `(id, source_url)` of a single media object.
pub fn media_from_value(value: &Value) -> Option<(u64, String)> {
    let id = value.get("id").and_then(Value::as_u64).filter(|id| *id > 0)?;
    let url = string_field(value, "source_url").or_else(|| string_field(value, "guid"));
    Some((id, url.unwrap_or_default().to_string()))
}

fn matches_stem(value: &Value, stem: &str) -> bool {
    let slug_matches = string_field(value, "slug").is_some_and(|slug| slug.eq_ignore_ascii_case(stem));
    let url_matches = string_field(value, "source_url")
        .and_then(|url| url.rsplit('/').next())
        .and_then(|file| file.rsplit_once('.').map(|(s, _)| s))
        .is_some_and(|file_stem| file_stem.eq_ignore_ascii_case(stem));
    slug_matches || url_matches
}

/// Pick the uploaded resource out of an upload response.
///
/// An object body is taken as is; a list prefers the element matching the
/// file stem, else the first element.
pub fn select_uploaded(response: &RawResponse, stem: &str) -> Option<(u64, String)> {
    match response.json()? {
        Value::Array(items) => items
            .iter()
            .find(|item| matches_stem(item, stem))
            .and_then(media_from_value)
            .or_else(|| items.iter().find_map(media_from_value)),
        object @ Value::Object(_) => media_from_value(&object),
        _ => None,
    }
}

pub struct MediaSynchronizer {
    client: Arc<dyn RemoteClient>,
    ledger: Arc<dyn MediaLedger>,
    source: Arc<dyn MediaSource>,
    optimizer: Option<Arc<dyn AssetOptimizer>>,
}

impl MediaSynchronizer {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        ledger: Arc<dyn MediaLedger>,
        source: Arc<dyn MediaSource>,
    ) -> Self {
        Self { client, ledger, source, optimizer: None }
    }

    /// Run assets through `optimizer` before upload.
    pub fn with_optimizer(mut self, optimizer: Arc<dyn AssetOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Ensure a remote copy of `media` exists on the target.
    ///
    /// An existing `success` record short-circuits without any remote call.
    /// Any other state, `failed` included, is reset and uploaded again.
    #[instrument(skip(self, remote, media), fields(target_id = remote.id(), media_id = media.id))]
    pub async fn ensure_media(
        &self,
        remote: &RemoteTarget,
        media: &MediaRef,
    ) -> Result<MediaSyncRecord, SyncError> {
        let target_id = remote.id();
        if let Some(existing) = self.ledger.get(target_id, media.id).await? {
            if existing.status == MediaSyncStatus::Success && existing.remote_id.is_some() {
                debug!("media already synced");
                return Ok(existing);
            }
        }

        self.ledger.begin(target_id, media).await?;
        self.ledger.transition(target_id, media.id, MediaSyncStatus::Uploading, None, None).await?;

        match self.upload(remote, media).await {
            Ok((remote_id, remote_url)) => {
                info!(remote_id, "media synced");
                let record = self
                    .ledger
                    .transition(
                        target_id,
                        media.id,
                        MediaSyncStatus::Success,
                        Some((remote_id, remote_url)),
                        None,
                    )
                    .await?;
                Ok(record)
            }
            Err(err) => {
                warn!(error = %err, "media sync failed");
                if let Err(ledger_err) = self
                    .ledger
                    .transition(
                        target_id,
                        media.id,
                        MediaSyncStatus::Failed,
                        None,
                        Some(&err.ledger_message()),
                    )
                    .await
                {
                    warn!(error = %ledger_err, "failed to record media failure");
                }
                Err(err)
            }
        }
    }

    async fn upload(
        &self,
        remote: &RemoteTarget,
        media: &MediaRef,
    ) -> Result<(u64, String), SyncError> {
        let mut asset = self.source.load(media).await?;
        if let Some(optimizer) = &self.optimizer {
            asset = optimizer.optimize(asset).await?;
        }

        let extension = asset
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .or_else(|| media.extension());
        let upload = MediaUpload {
            content_type: content_type_for(extension.as_deref()).to_string(),
            file_name: asset.file_name,
            bytes: asset.bytes,
            title: media.title.clone(),
            alt_text: media.alt_text.clone(),
        };

        let stem = media.file_stem();
        let response = self.client.upload_media(remote, &upload).await?;
        if let Some(found) = select_uploaded(&response, &stem) {
            return Ok(found);
        }

        debug!(stem = %stem, status = response.status, "upload response lacked media, searching");
        let candidates = self.client.search_media(remote, &stem).await?;
        candidates
            .iter()
            .find(|m| m.slug.eq_ignore_ascii_case(&stem))
            .or_else(|| candidates.first())
            .map(|m| (m.id, m.source_url.clone()))
            .ok_or_else(|| {
                SyncError::AmbiguousResponse(format!(
                    "upload of '{}' returned no usable media object",
                    upload.file_name
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::sync::ports::MediaAsset;
    use crate::testing::{
        media, remote_target, FakeRemote, MemoryMediaLedger, MemoryMediaSource, Reply,
    };

    struct Fixture {
        remote: Arc<FakeRemote>,
        ledger: Arc<MemoryMediaLedger>,
        source: Arc<MemoryMediaSource>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                remote: Arc::new(FakeRemote::new()),
                ledger: Arc::new(MemoryMediaLedger::new()),
                source: Arc::new(MemoryMediaSource::new()),
            }
        }

        fn synchronizer(&self) -> MediaSynchronizer {
            MediaSynchronizer::new(self.remote.clone(), self.ledger.clone(), self.source.clone())
        }
    }

    struct RejectingOptimizer;

    #[async_trait]
    impl AssetOptimizer for RejectingOptimizer {
        async fn optimize(&self, _asset: MediaAsset) -> Result<MediaAsset, SyncError> {
            Err(SyncError::Validation { status: None, message: "asset too large".into() })
        }
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for(Some("jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Some("png")), "image/png");
        assert_eq!(content_type_for(Some("xyz")), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for(None), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn list_response_prefers_matching_stem() {
        let body = json!([
            { "id": 1, "slug": "other", "source_url": "https://r.test/other.png" },
            { "id": 2, "slug": "hero", "source_url": "https://r.test/hero.png" }
        ]);
        let response = RawResponse::new(200, body.to_string());
        assert_eq!(select_uploaded(&response, "hero"), Some((2, "https://r.test/hero.png".into())));
        assert_eq!(select_uploaded(&response, "nothing").map(|(id, _)| id), Some(1));
    }

    #[test]
    fn rendered_fields_are_accepted() {
        let value = json!({ "id": 4, "guid": { "rendered": "https://r.test/a.jpg" } });
        assert_eq!(media_from_value(&value), Some((4, "https://r.test/a.jpg".into())));
    }

    #[tokio::test]
    async fn uploads_once_then_short_circuits() {
        let fx = Fixture::new();
        let target = remote_target("t1");
        let hero = media(10, "hero.png");

        let first = fx.synchronizer().ensure_media(&target, &hero).await.unwrap();
        let second = fx.synchronizer().ensure_media(&target, &hero).await.unwrap();

        assert_eq!(first.status, MediaSyncStatus::Success);
        assert_eq!(first.remote_id, second.remote_id);
        assert_eq!(first.remote_url.as_deref(), Some("https://t1.remote.test/uploads/hero.png"));
        assert_eq!(fx.remote.call_count("upload_media"), 1);
    }

    #[tokio::test]
    async fn list_response_resolves_uploaded_item() {
        let fx = Fixture::new();
        fx.remote.script_upload(Reply::List);

        let record =
            fx.synchronizer().ensure_media(&remote_target("t1"), &media(3, "cover.jpg")).await.unwrap();

        assert_ne!(record.remote_id, Some(999_999));
        assert_eq!(record.remote_id, fx.remote.media("t1").first().map(|m| m.id));
    }

    #[tokio::test]
    async fn empty_response_falls_back_to_search() {
        let fx = Fixture::new();
        fx.remote.script_upload(Reply::Empty);

        let record =
            fx.synchronizer().ensure_media(&remote_target("t1"), &media(3, "cover.jpg")).await.unwrap();

        assert_eq!(fx.remote.call_count("search_media"), 1);
        assert_eq!(record.remote_id, fx.remote.media("t1").first().map(|m| m.id));
    }

    #[tokio::test]
    async fn failure_is_recorded_and_retried_on_next_sync() {
        let fx = Fixture::new();
        let target = remote_target("t1");
        let hero = media(10, "hero.png");
        fx.remote.script_upload(Reply::Fail(SyncError::server(503, "unavailable")));

        let err = fx.synchronizer().ensure_media(&target, &hero).await.unwrap_err();
        assert!(matches!(err, SyncError::Server { .. }));
        let failed = fx.ledger.rows().pop().unwrap();
        assert_eq!(failed.status, MediaSyncStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert!(failed.last_error.unwrap().starts_with("server:"));

        let record = fx.synchronizer().ensure_media(&target, &hero).await.unwrap();
        assert_eq!(record.status, MediaSyncStatus::Success);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.last_error, None);
    }

    #[tokio::test]
    async fn missing_local_file_fails_without_upload() {
        let fx = Fixture::new();
        let hero = media(10, "hero.png");
        fx.source.mark_missing(&hero.source_url);

        let err = fx.synchronizer().ensure_media(&remote_target("t1"), &hero).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert_eq!(fx.remote.call_count("upload_media"), 0);
        assert_eq!(fx.ledger.rows()[0].status, MediaSyncStatus::Failed);
    }

    #[tokio::test]
    async fn optimizer_rejection_marks_failed() {
        let fx = Fixture::new();
        let sync = fx.synchronizer().with_optimizer(Arc::new(RejectingOptimizer));

        let err = sync.ensure_media(&remote_target("t1"), &media(1, "huge.png")).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
        assert_eq!(fx.remote.call_count("upload_media"), 0);
    }
}
