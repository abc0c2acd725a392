//! Application context - dependency injection container

use std::sync::Arc;

use relaypost_common::HostRateLimiter;
use relaypost_core::{
    CredentialStore, LedgerMaintenance, MediaSynchronizer, RemoteClient, SettingsStore,
    SyncOrchestrator, TargetPipeline, TargetRegistry, TaxonomyResolver,
};
use relaypost_domain::{Result, Settings};
use relaypost_infra::config;
use relaypost_infra::{
    DbManager, FsContentSource, FsMediaSource, HttpClient, ImageOptimizer,
    KeyringCredentialStore, RestClientConfig, RestRemoteClient, SharedSettings,
    SqliteMediaLedger, SqliteSyncLedger, SqliteTargetRepository, SqliteTaskQueue,
    SqliteTermMappings,
};
use tracing::info;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub settings: SharedSettings,
    pub db: Arc<DbManager>,

    // Repositories
    pub targets: Arc<SqliteTargetRepository>,
    pub ledger: Arc<SqliteSyncLedger>,
    pub media_ledger: Arc<SqliteMediaLedger>,
    pub mappings: Arc<SqliteTermMappings>,
    pub queue: Arc<SqliteTaskQueue>,
    pub credentials: Arc<dyn CredentialStore>,

    // Services
    pub registry: Arc<TargetRegistry>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub maintenance: Arc<LedgerMaintenance>,
}

/// REST client honouring the configured retries, timeouts and pacing.
pub fn build_remote_client(settings: &Settings) -> Result<Arc<dyn RemoteClient>> {
    let limiter = Arc::new(HostRateLimiter::with_pacing(settings.sync_settings.rate_limit));
    let http = HttpClient::builder().limiter(limiter).build()?;
    let config = RestClientConfig::from_settings(&settings.api_settings);
    Ok(Arc::new(RestRemoteClient::new(http, config)))
}

impl AppContext {
    /// Production wiring: keyring secrets and the REST client.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_credentials(settings, Arc::new(KeyringCredentialStore::new()))
    }

    /// REST client with a caller-supplied credential store.
    pub fn with_credentials(
        settings: Settings,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let remote = build_remote_client(&settings)?;
        Self::assemble(settings, credentials, remote)
    }

    /// Wire every service over the configured database.
    ///
    /// Opens (and migrates) the database at `settings.database.path`.
    pub fn assemble(
        settings: Settings,
        credentials: Arc<dyn CredentialStore>,
        remote: Arc<dyn RemoteClient>,
    ) -> Result<Self> {
        config::validate(&settings)?;
        let db = Arc::new(DbManager::open(&settings.database)?);
        let settings = SharedSettings::new(settings);
        let snapshot = settings.settings();

        let targets = Arc::new(SqliteTargetRepository::new(Arc::clone(&db)));
        let ledger = Arc::new(SqliteSyncLedger::new(Arc::clone(&db)));
        let media_ledger = Arc::new(SqliteMediaLedger::new(Arc::clone(&db)));
        let mappings = Arc::new(SqliteTermMappings::new(Arc::clone(&db)));
        let queue = Arc::new(SqliteTaskQueue::new(Arc::clone(&db)));

        let content = Arc::new(FsContentSource::new(snapshot.content.root.clone()));
        let media_source = Arc::new(FsMediaSource::new(snapshot.content.root.clone()));
        let optimizer = Arc::new(ImageOptimizer::from_settings(&snapshot.image_settings));

        let taxonomy = TaxonomyResolver::new(remote.clone(), mappings.clone(), content.clone());
        let media = MediaSynchronizer::new(remote.clone(), media_ledger.clone(), media_source)
            .with_optimizer(optimizer);
        let pipeline = Arc::new(TargetPipeline::new(
            remote,
            ledger.clone(),
            credentials.clone(),
            taxonomy,
            media,
        ));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            pipeline,
            targets.clone(),
            content,
            ledger.clone(),
            media_ledger.clone(),
            queue.clone(),
            Arc::new(settings.clone()),
        ));
        let registry =
            Arc::new(TargetRegistry::new(targets.clone(), credentials.clone(), mappings.clone()));
        let maintenance = Arc::new(LedgerMaintenance::new(
            ledger.clone(),
            media_ledger.clone(),
            queue.clone(),
        ));

        info!(
            db_path = %db.path().display(),
            content_root = %snapshot.content.root,
            mode = %snapshot.dispatch_mode(),
            "application context ready"
        );

        Ok(Self {
            settings,
            db,
            targets,
            ledger,
            media_ledger,
            mappings,
            queue,
            credentials,
            registry,
            orchestrator,
            maintenance,
        })
    }

    /// Current settings snapshot.
    pub fn current_settings(&self) -> Settings {
        self.settings.settings()
    }
}
