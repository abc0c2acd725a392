//! In-memory adapters for exercising the engine without I/O.
//!
//! Enabled for this crate's unit tests and, through the `test-utils`
//! feature, for integration tests of downstream crates.

mod remote;
mod stores;

use std::sync::Arc;

use relaypost_domain::{
    ContentItem, ContentStatus, Credentials, MediaRef, Result, Settings, Target, TermRef,
};

pub use remote::{FakeRemote, Reply};
pub use stores::{
    MemoryContentSource, MemoryCredentialStore, MemoryMediaLedger, MemoryMediaSource,
    MemorySyncLedger, MemoryTargets, MemoryTaskQueue, MemoryTermMappings,
};

use crate::sync::media::MediaSynchronizer;
use crate::sync::orchestrator::SyncOrchestrator;
use crate::sync::pipeline::TargetPipeline;
use crate::sync::ports::{CredentialStore, RemoteTarget, TargetRepository};
use crate::sync::taxonomy::TaxonomyResolver;

/// Target with a fixed id and a matching fake host.
pub fn target(id: &str) -> Target {
    Target {
        id: id.to_string(),
        name: format!("Site {id}"),
        base_url: format!("https://{id}.remote.test"),
        username: "editor".to_string(),
        active: true,
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
    }
}

pub fn remote_target(id: &str) -> RemoteTarget {
    RemoteTarget {
        target: target(id),
        credentials: Credentials { username: "editor".into(), app_password: "secret".into() },
    }
}

/// Published item with no terms or media.
pub fn sample_item(id: u64) -> ContentItem {
    ContentItem {
        id,
        title: format!("Sample post {id}"),
        body: "<p>Hello</p>".to_string(),
        excerpt: None,
        status: ContentStatus::Published,
        published_at: None,
        slug: format!("sample-post-{id}"),
        categories: Vec::new(),
        tags: Vec::new(),
        featured_media: None,
        attachments: Vec::new(),
        metadata: Default::default(),
    }
}

pub fn term(id: u64, name: &str, parent: Option<u64>) -> TermRef {
    TermRef {
        id,
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        parent,
        description: None,
    }
}

pub fn media(id: u64, file_name: &str) -> MediaRef {
    MediaRef {
        id,
        source_url: format!("https://local.test/uploads/{file_name}"),
        title: Some(format!("Media {id}")),
        alt_text: None,
    }
}

/// Fully wired engine over in-memory adapters.
pub struct TestEnv {
    pub remote: Arc<FakeRemote>,
    pub ledger: Arc<MemorySyncLedger>,
    pub media_ledger: Arc<MemoryMediaLedger>,
    pub mappings: Arc<MemoryTermMappings>,
    pub targets: Arc<MemoryTargets>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub content: Arc<MemoryContentSource>,
    pub media_source: Arc<MemoryMediaSource>,
    pub queue: Arc<MemoryTaskQueue>,
    pub settings: Settings,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            remote: Arc::new(FakeRemote::new()),
            ledger: Arc::new(MemorySyncLedger::new()),
            media_ledger: Arc::new(MemoryMediaLedger::new()),
            mappings: Arc::new(MemoryTermMappings::new()),
            targets: Arc::new(MemoryTargets::new()),
            credentials: Arc::new(MemoryCredentialStore::new()),
            content: Arc::new(MemoryContentSource::new()),
            media_source: Arc::new(MemoryMediaSource::new()),
            queue: Arc::new(MemoryTaskQueue::new()),
            settings: Settings::default(),
        }
    }

    /// Register an active target with stored credentials.
    pub async fn add_target(&self, id: &str) -> Result<Target> {
        let target = target(id);
        self.targets.save(&target).await?;
        self.credentials.store(id, "secret").await?;
        Ok(target)
    }

    pub fn pipeline(&self) -> Arc<TargetPipeline> {
        let taxonomy = TaxonomyResolver::new(
            self.remote.clone(),
            self.mappings.clone(),
            self.content.clone(),
        );
        let media = MediaSynchronizer::new(
            self.remote.clone(),
            self.media_ledger.clone(),
            self.media_source.clone(),
        );
        Arc::new(TargetPipeline::new(
            self.remote.clone(),
            self.ledger.clone(),
            self.credentials.clone(),
            taxonomy,
            media,
        ))
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.pipeline(),
            self.targets.clone(),
            self.content.clone(),
            self.ledger.clone(),
            self.media_ledger.clone(),
            self.queue.clone(),
            Arc::new(self.settings.clone()),
        )
    }
}
