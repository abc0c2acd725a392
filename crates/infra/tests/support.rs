#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use relaypost_common::{BackoffPolicy, HostRateLimiter};
use relaypost_core::testing::{MemoryContentSource, MemoryMediaSource};
use relaypost_core::{
    CredentialStore, MediaSynchronizer, RemoteClient, SyncOrchestrator, TargetPipeline,
    TargetRepository, TaxonomyResolver,
};
use relaypost_domain::{Settings, Target};
use relaypost_infra::database::{
    DbManager, SqliteMediaLedger, SqliteSyncLedger, SqliteTargetRepository, SqliteTaskQueue,
    SqliteTermMappings,
};
use relaypost_infra::http::{HttpClient, RestClientConfig, RestRemoteClient};
use relaypost_infra::StaticCredentialStore;
use tempfile::TempDir;

/// Temporary database that keeps its file alive for the test's duration.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("relaypost-test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    pub fn execute_batch(&self, sql: &str) {
        let conn = self.manager.get_connection().expect("connection should be available");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine wired over the SQLite adapters with in-memory content.
pub struct SqliteEngine {
    pub db: TestDatabase,
    pub remote: Arc<dyn RemoteClient>,
    pub ledger: Arc<SqliteSyncLedger>,
    pub media_ledger: Arc<SqliteMediaLedger>,
    pub mappings: Arc<SqliteTermMappings>,
    pub targets: Arc<SqliteTargetRepository>,
    pub queue: Arc<SqliteTaskQueue>,
    pub credentials: Arc<StaticCredentialStore>,
    pub content: Arc<MemoryContentSource>,
    pub media_source: Arc<MemoryMediaSource>,
    pub settings: Settings,
}

impl SqliteEngine {
    pub fn new(remote: Arc<dyn RemoteClient>) -> Self {
        let db = TestDatabase::new();
        let manager = Arc::clone(&db.manager);
        Self {
            remote,
            ledger: Arc::new(SqliteSyncLedger::new(manager.clone())),
            media_ledger: Arc::new(SqliteMediaLedger::new(manager.clone())),
            mappings: Arc::new(SqliteTermMappings::new(manager.clone())),
            targets: Arc::new(SqliteTargetRepository::new(manager.clone())),
            queue: Arc::new(SqliteTaskQueue::new(manager)),
            credentials: Arc::new(StaticCredentialStore::new()),
            content: Arc::new(MemoryContentSource::new()),
            media_source: Arc::new(MemoryMediaSource::new()),
            settings: Settings::default(),
            db,
        }
    }

    /// Register an active target whose base URL is `base_url`.
    pub async fn add_target(&self, name: &str, base_url: &str) -> Target {
        let target = Target::new(name, base_url, "editor").expect("valid target");
        self.targets.save(&target).await.expect("target saved");
        self.credentials.store(&target.id, "app pass").await.expect("secret stored");
        target
    }

    pub fn pipeline(&self) -> Arc<TargetPipeline> {
        let taxonomy =
            TaxonomyResolver::new(self.remote.clone(), self.mappings.clone(), self.content.clone());
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

/// REST client with millisecond backoff and no host pacing.
pub fn fast_rest_client(max_attempts: u32) -> RestRemoteClient {
    let backoff = BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(40))
        .expect("valid backoff")
        .with_jitter_factor(0.0);
    let http = HttpClient::builder()
        .limiter(Arc::new(HostRateLimiter::without_pacing()))
        .timeout(Duration::from_secs(5))
        .build()
        .expect("http client");
    RestRemoteClient::new(
        http,
        RestClientConfig {
            max_attempts,
            timeout: Duration::from_secs(5),
            post_backoff: backoff,
            media_backoff: backoff,
            ..RestClientConfig::default()
        },
    )
}
