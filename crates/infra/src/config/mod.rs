//! Configuration loading and management
//!
//! This module loads [`relaypost_domain::Settings`] from files and
//! environment variables and exposes them to the engine through the
//! `SettingsStore` port.

pub mod loader;
pub mod shared;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, load_with, probe_config_paths, validate};
pub use shared::SharedSettings;
