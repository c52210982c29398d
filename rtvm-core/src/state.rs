// rtvm-core/src/state.rs
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;

use fs4::FileExt;
use rtvm_common::config::Config;
use rtvm_common::error::{Result, RtvmError};
use rtvm_common::model::InstallState;
use tracing::{debug, warn};

use crate::fs::atomic_write_file;

/// Loads and saves the JSON state document under the rtvm root.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    install_dir: PathBuf,
}

impl StateStore {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.state_file(),
            install_dir: config.install_dir().to_path_buf(),
        }
    }

    /// A missing file yields the empty default state. The document is
    /// normalized on the way in so callers can rely on its invariants.
    pub fn load(&self) -> Result<InstallState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}; starting empty", self.path.display());
                return Ok(InstallState::new(&self.install_dir));
            }
            Err(e) => {
                return Err(RtvmError::IoError(format!(
                    "Failed to read state file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut state: InstallState = serde_json::from_str(&content).map_err(|e| {
            RtvmError::Parse(
                "state file",
                format!("{}: {}", self.path.display(), e),
            )
        })?;
        if state.install_dir.as_os_str().is_empty() {
            state.install_dir = self.install_dir.clone();
        } else if state.install_dir != self.install_dir {
            warn!(
                "State file records install dir {} but configuration uses {}",
                state.install_dir.display(),
                self.install_dir.display()
            );
        }
        if state.normalize() {
            debug!("Normalized state loaded from {}", self.path.display());
        }
        Ok(state)
    }

    pub fn save(&self, state: &InstallState) -> Result<()> {
        let content = serde_json::to_vec_pretty(state)?;
        atomic_write_file(&self.path, &content)?;
        debug!(
            "Saved state ({} versions, current '{}') to {}",
            state.versions.len(),
            state.current_version,
            self.path.display()
        );
        Ok(())
    }
}

/// Exclusive advisory lock on `<root>/rtvm.lock`, held for the lifetime of
/// the value.
#[derive(Debug)]
pub struct OperationLock {
    file: File,
    path: PathBuf,
}

impl OperationLock {
    /// Blocks until the lock is available.
    pub fn acquire(config: &Config) -> Result<Self> {
        let path = config.lock_file();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                RtvmError::IoError(format!(
                    "Failed to open lock file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        debug!("Waiting for lock {}", path.display());
        file.lock_exclusive().map_err(|e| {
            RtvmError::IoError(format!("Failed to lock {}: {}", path.display(), e))
        })?;
        debug!("Acquired lock {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
