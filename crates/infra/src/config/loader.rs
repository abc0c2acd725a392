//! Configuration loader
//!
//! Loads [`Settings`] from a config file and environment variables.
//!
//! ## Loading Strategy
//! 1. `RELAYPOST_CONFIG` names an explicit file, otherwise standard paths are
//!    probed
//! 2. No file found means defaults; a partial file fills the rest with
//!    defaults
//! 3. `RELAYPOST_*` environment variables override whatever the file set
//! 4. The merged result is validated
//!
//! ## Environment Variables
//! - `RELAYPOST_DB_PATH`, `RELAYPOST_DB_POOL_SIZE`
//! - `RELAYPOST_API_TIMEOUT`, `RELAYPOST_API_RETRIES`, `RELAYPOST_BATCH_SIZE`
//! - `RELAYPOST_PARALLEL_SYNC`, `RELAYPOST_ASYNC_SYNC`, `RELAYPOST_RATE_LIMIT`
//! - `RELAYPOST_DEFERRED_DELAY`, `RELAYPOST_WORKER_POLL`
//! - `RELAYPOST_MAX_IMAGE_SIZE`, `RELAYPOST_IMAGE_QUALITY`
//! - `RELAYPOST_CONTENT_ROOT`, `RELAYPOST_SWEEP_CRON`
//!
//! ## File Locations
//! The loader probes, in order, the working directory and then the
//! executable's directory for `relaypost.toml`, `relaypost.json`,
//! `config.toml` and `config.json`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use relaypost_domain::{RelayPostError, Result, Settings};

const CONFIG_PATH_VAR: &str = "RELAYPOST_CONFIG";
const CANDIDATE_NAMES: [&str; 4] =
    ["relaypost.toml", "relaypost.json", "config.toml", "config.json"];

/// Load settings from the probed file (if any) with environment overrides.
///
/// # Errors
/// Returns `RelayPostError::Config` if an explicit file is missing, a file
/// cannot be parsed, an override has an invalid value, or the merged
/// settings fail validation.
pub fn load() -> Result<Settings> {
    load_with(None)
}

/// Like [`load`], but `path` (when given) takes precedence over
/// `RELAYPOST_CONFIG` and the probed locations.
///
/// # Errors
/// Same as [`load`].
pub fn load_with(path: Option<PathBuf>) -> Result<Settings> {
    let explicit = path.or_else(|| std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from));
    let mut settings = match explicit.or_else(probe_config_paths) {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found, using defaults");
            Settings::default()
        }
    };

    apply_env_overrides(&mut settings)?;
    validate(&settings)?;
    Ok(settings)
}

/// Defaults with environment overrides only, ignoring config files.
///
/// # Errors
/// Returns `RelayPostError::Config` if an override has an invalid value.
pub fn load_from_env() -> Result<Settings> {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings)?;
    validate(&settings)?;
    Ok(settings)
}

/// Load settings from a file.
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `RelayPostError::Config` if the file is missing or malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Settings> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(RelayPostError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            RelayPostError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| RelayPostError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Settings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| RelayPostError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| RelayPostError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(RelayPostError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CANDIDATE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn apply_env_overrides(settings: &mut Settings) -> Result<()> {
    if let Some(path) = env_string("RELAYPOST_DB_PATH") {
        settings.database.path = path;
    }
    if let Some(size) = env_parse("RELAYPOST_DB_POOL_SIZE")? {
        settings.database.pool_size = size;
    }

    let api = &mut settings.api_settings;
    if let Some(timeout) = env_parse("RELAYPOST_API_TIMEOUT")? {
        api.timeout = timeout;
    }
    if let Some(retries) = env_parse("RELAYPOST_API_RETRIES")? {
        api.retries = retries;
    }
    if let Some(batch) = env_parse("RELAYPOST_BATCH_SIZE")? {
        api.batch_size = batch;
    }

    let sync = &mut settings.sync_settings;
    sync.parallel_sync = env_bool("RELAYPOST_PARALLEL_SYNC", sync.parallel_sync);
    sync.async_sync = env_bool("RELAYPOST_ASYNC_SYNC", sync.async_sync);
    sync.rate_limit = env_bool("RELAYPOST_RATE_LIMIT", sync.rate_limit);
    if let Some(delay) = env_parse("RELAYPOST_DEFERRED_DELAY")? {
        sync.deferred_delay_secs = delay;
    }
    if let Some(poll) = env_parse("RELAYPOST_WORKER_POLL")? {
        sync.worker_poll_secs = poll;
    }

    if let Some(size) = env_parse("RELAYPOST_MAX_IMAGE_SIZE")? {
        settings.image_settings.max_image_size = size;
    }
    if let Some(quality) = env_parse("RELAYPOST_IMAGE_QUALITY")? {
        settings.image_settings.image_quality = quality;
    }

    if let Some(root) = env_string("RELAYPOST_CONTENT_ROOT") {
        settings.content.root = root;
    }
    if let Some(cron) = env_string("RELAYPOST_SWEEP_CRON") {
        settings.sweeper.cron_expression = cron;
    }
    Ok(())
}

/// Reject values the engine cannot run with.
///
/// # Errors
/// Returns `RelayPostError::Config` naming the offending key.
pub fn validate(settings: &Settings) -> Result<()> {
    if settings.api_settings.retries == 0 {
        return invalid("api_settings.retries", "must be at least 1");
    }
    if settings.api_settings.timeout == 0 {
        return invalid("api_settings.timeout", "must be at least 1 second");
    }
    if settings.api_settings.batch_size == 0 {
        return invalid("api_settings.batch_size", "must be at least 1");
    }
    if !(1..=100).contains(&settings.image_settings.image_quality) {
        return invalid("image_settings.image_quality", "must be between 1 and 100");
    }
    if settings.database.pool_size == 0 {
        return invalid("database.pool_size", "must be at least 1");
    }
    if settings.sync_settings.worker_poll_secs == 0 {
        return invalid("sync_settings.worker_poll_secs", "must be at least 1 second");
    }
    Ok(())
}

fn invalid(key: &str, reason: &str) -> Result<()> {
    Err(RelayPostError::Config(format!("Invalid {key}: {reason}")))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| RelayPostError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
