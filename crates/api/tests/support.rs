#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use relaypost_app::AppContext;
use relaypost_core::testing::FakeRemote;
use relaypost_domain::{ContentItem, Settings};
use relaypost_infra::StaticCredentialStore;
use tempfile::TempDir;

/// Application context over a temporary database and content root, with the
/// scriptable in-memory remote.
pub struct TestApp {
    pub ctx: AppContext,
    pub remote: Arc<FakeRemote>,
    pub credentials: Arc<StaticCredentialStore>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(customise: impl FnOnce(&mut Settings)) -> Self {
        let dir = TempDir::new().expect("temp dir should be created");
        let mut settings = Settings::default();
        settings.database.path = dir.path().join("relaypost.db").to_string_lossy().into_owned();
        settings.content.root = dir.path().join("content").to_string_lossy().into_owned();
        settings.sync_settings.rate_limit = false;
        customise(&mut settings);

        let remote = Arc::new(FakeRemote::new());
        let credentials = Arc::new(StaticCredentialStore::new());
        let ctx = AppContext::assemble(settings, credentials.clone(), remote.clone())
            .expect("context should assemble");

        Self { ctx, remote, credentials, dir }
    }

    pub fn content_root(&self) -> PathBuf {
        self.dir.path().join("content")
    }

    /// Write `item` where the filesystem content source looks for it.
    pub fn write_item(&self, item: &ContentItem) {
        let items = self.content_root().join("items");
        std::fs::create_dir_all(&items).expect("items dir should be created");
        let json = serde_json::to_string_pretty(item).expect("item should serialise");
        std::fs::write(items.join(format!("{}.json", item.id)), json)
            .expect("item file should be written");
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
