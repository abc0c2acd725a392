use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relaypost_core::{MediaAsset, MediaSource};
use relaypost_domain::{MediaRef, RelayPostError, Result};
use tracing::debug;
use url::Url;

/// Loads media bytes from local disk.
///
/// `source_url` may be a `file://` URL, an absolute path, a path relative to
/// the content root, or an `http(s)` URL whose path is mirrored under
/// `<root>/media`.
pub struct FsMediaSource {
    root: PathBuf,
}

impl FsMediaSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, media: &MediaRef) -> Result<PathBuf> {
        let source = media.source_url.trim();
        if source.is_empty() {
            return Err(RelayPostError::InvalidInput(format!("media {} has no source", media.id)));
        }

        match Url::parse(source) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().map_err(|()| {
                RelayPostError::InvalidInput(format!("invalid file URL for media {}", media.id))
            }),
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let relative = url.path().trim_start_matches('/');
                Ok(self.root.join("media").join(relative))
            }
            Ok(url) if url.scheme().len() > 1 => Err(RelayPostError::InvalidInput(format!(
                "unsupported media scheme {} for media {}",
                url.scheme(),
                media.id
            ))),
            // Plain paths; a one-letter "scheme" is a Windows drive letter.
            _ => {
                let path = Path::new(source);
                Ok(if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) })
            }
        }
    }
}

#[async_trait]
impl MediaSource for FsMediaSource {
    async fn load(&self, media: &MediaRef) -> Result<MediaAsset> {
        let path = self.resolve(media)?;
        debug!(media_id = media.id, path = %path.display(), "loading media");

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayPostError::NotFound(format!("media {} at {}", media.id, path.display()))
            } else {
                RelayPostError::Internal(format!("failed to read {}: {e}", path.display()))
            }
        })?;
        Ok(MediaAsset { file_name: media.file_name(), bytes })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn media(source_url: &str) -> MediaRef {
        MediaRef { id: 5, source_url: source_url.into(), title: None, alt_text: None }
    }

    #[tokio::test]
    async fn loads_absolute_relative_and_file_urls() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        let file = dir.path().join("uploads/hero.png");
        std::fs::write(&file, b"png-bytes").unwrap();
        let source = FsMediaSource::new(dir.path());

        let absolute = source.load(&media(file.to_str().unwrap())).await.unwrap();
        assert_eq!(absolute.bytes, b"png-bytes");
        assert_eq!(absolute.file_name, "hero.png");

        let relative = source.load(&media("uploads/hero.png")).await.unwrap();
        assert_eq!(relative.size(), 9);

        let url = Url::from_file_path(&file).unwrap();
        let from_url = source.load(&media(url.as_str())).await.unwrap();
        assert_eq!(from_url.bytes, b"png-bytes");
    }

    #[tokio::test]
    async fn http_sources_resolve_under_media_mirror() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("media/wp-content/uploads")).unwrap();
        std::fs::write(dir.path().join("media/wp-content/uploads/a.jpg"), b"jpg").unwrap();

        let asset = FsMediaSource::new(dir.path())
            .load(&media("https://local.test/wp-content/uploads/a.jpg?ver=2"))
            .await
            .unwrap();

        assert_eq!(asset.file_name, "a.jpg");
        assert_eq!(asset.bytes, b"jpg");
    }

    #[tokio::test]
    async fn missing_and_unsupported_sources_fail() {
        let dir = TempDir::new().unwrap();
        let source = FsMediaSource::new(dir.path());

        assert!(matches!(source.load(&media("nope.png")).await, Err(RelayPostError::NotFound(_))));
        assert!(matches!(
            source.load(&media("ftp://host/a.png")).await,
            Err(RelayPostError::InvalidInput(_))
        ));
        assert!(matches!(source.load(&media(" ")).await, Err(RelayPostError::InvalidInput(_))));
    }
}
