//! Process-wide settings handle.

use std::sync::Arc;

use parking_lot::RwLock;
use relaypost_core::SettingsStore;
use relaypost_domain::{Result, Settings};

use super::loader;

/// Settings shared between the CLI, the orchestrator and background workers.
///
/// Readers take a snapshot; `replace`/`reload` swap the whole value so a
/// reader never observes a half-updated configuration.
#[derive(Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self { inner: Arc::new(RwLock::new(settings)) }
    }

    /// Validate and install a new value.
    pub fn replace(&self, settings: Settings) -> Result<()> {
        loader::validate(&settings)?;
        *self.inner.write() = settings;
        Ok(())
    }

    /// Re-run the loader and install the result. The old value is kept when
    /// loading fails.
    pub fn reload(&self) -> Result<()> {
        let settings = loader::load()?;
        *self.inner.write() = settings;
        tracing::info!("settings reloaded");
        Ok(())
    }
}

impl SettingsStore for SharedSettings {
    fn settings(&self) -> Settings {
        self.inner.read().clone()
    }
}
