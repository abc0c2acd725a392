//! Single-worker lock using a PID file next to the ledger database.
//!
//! Task claiming is atomic, so a second worker would be safe but would only
//! compete for the same rows and the same per-host pacing windows.

use std::fs;
use std::path::{Path, PathBuf};

use relaypost_domain::{RelayPostError, Result};

/// Held for the lifetime of a `relaypost worker` process.
#[derive(Debug)]
pub struct WorkerLock {
    pid_file: PathBuf,
}

impl WorkerLock {
    /// Lock file path for the database at `db_path`.
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".worker.pid");
        db_path.with_file_name(name)
    }

    /// Take the lock for `db_path`. A PID file left by a dead process is
    /// replaced.
    ///
    /// # Errors
    /// Returns `RelayPostError::Config` if a live worker holds the lock or
    /// the PID file cannot be written.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let pid_file = Self::path_for(db_path);

        if let Ok(content) = fs::read_to_string(&pid_file) {
            match content.trim().parse::<u32>() {
                Ok(pid) if pid != std::process::id() && is_process_running(pid) => {
                    tracing::warn!(existing_pid = pid, "worker lock held");
                    return Err(RelayPostError::Config(format!(
                        "another worker is already running for this database (PID {pid})"
                    )));
                }
                Ok(pid) => tracing::warn!(stale_pid = pid, "replacing stale worker lock"),
                Err(_) => tracing::warn!(path = %pid_file.display(), "replacing unreadable worker lock"),
            }
        }

        let current_pid = std::process::id();
        fs::write(&pid_file, current_pid.to_string()).map_err(|e| {
            RelayPostError::Config(format!("failed to write {}: {e}", pid_file.display()))
        })?;

        tracing::info!(pid = current_pid, path = %pid_file.display(), "worker lock acquired");
        Ok(Self { pid_file })
    }
}

#[cfg(target_os = "linux")]
fn is_process_running(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_running(pid: u32) -> bool {
    // `kill -0` checks for existence without sending a signal.
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_process_running(pid: u32) -> bool {
    tracing::warn!(pid, "process liveness check unsupported on this platform");
    false
}

impl Drop for WorkerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.pid_file) {
            tracing::warn!(error = %e, path = %self.pid_file.display(), "failed to remove worker lock");
        } else {
            tracing::debug!(path = %self.pid_file.display(), "worker lock released");
        }
    }
}
