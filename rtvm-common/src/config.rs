// rtvm-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::UserDirs;
use tracing::debug;

use super::error::{Result, RtvmError};

const DEFAULT_ROOT_DIRNAME: &str = ".rtvm";
const DEFAULT_PRIMARY_BASE_URL: &str = "https://go.dev";
const DEFAULT_MIRROR_BASE_URL: &str = "https://golang.google.cn";
const STATE_FILENAME: &str = "config.json";
const LOCK_FILENAME: &str = "rtvm.lock";

pub const ROOT_ENV_VAR: &str = "RTVM_ROOT";
pub const INSTALL_DIR_ENV_VAR: &str = "RTVM_INSTALL_DIR";
pub const MIRROR_ENV_VAR: &str = "RTVM_DL_MIRROR";

/// Attempts per base location and the linear backoff step between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts_per_base: u32,
    pub backoff_step: Duration,
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// A policy that never sleeps, for tests and offline tooling.
    pub fn immediate(attempts_per_base: u32) -> Self {
        Self {
            attempts_per_base,
            backoff_step: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_base: 3,
            backoff_step: Duration::from_millis(500),
        }
    }
}

/// Shape of a runtime distribution: how versions are spelled and what an
/// unpacked release must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    /// Prefix every canonical version id carries, e.g. `go` in `go1.21.5`.
    pub version_prefix: String,
    /// Single top-level directory every archive entry lives under.
    pub archive_root: String,
    /// File inside an installation whose first line is the version id.
    pub marker_file: String,
    /// Entry-point binary name, without platform extension.
    pub entrypoint: String,
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self {
            version_prefix: "go".to_string(),
            archive_root: "go".to_string(),
            marker_file: "VERSION".to_string(),
            entrypoint: "go".to_string(),
        }
    }
}

impl RuntimeLayout {
    /// Entry-point file name with the platform's executable suffix.
    pub fn entrypoint_filename(&self) -> String {
        format!("{}{}", self.entrypoint, env::consts::EXE_SUFFIX)
    }

    /// Path of the entry-point binary relative to an installation directory.
    pub fn entrypoint_relative_path(&self) -> PathBuf {
        Path::new("bin").join(self.entrypoint_filename())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rtvm_root: PathBuf,
    pub install_dir: PathBuf,
    pub primary_base_url: String,
    pub mirror_base_url: String,
    pub retry: RetryPolicy,
    pub layout: RuntimeLayout,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading rtvm configuration");

        let rtvm_root = match env::var(ROOT_ENV_VAR).ok().filter(|s| !s.is_empty()) {
            Some(root) => PathBuf::from(root),
            None => {
                let home = UserDirs::new()
                    .map(|ud| ud.home_dir().to_path_buf())
                    .ok_or_else(|| {
                        RtvmError::Config("Could not determine the user's home directory".into())
                    })?;
                home.join(DEFAULT_ROOT_DIRNAME)
            }
        };
        debug!("Effective RTVM_ROOT set to: {}", rtvm_root.display());

        let mut config = Self::with_root(rtvm_root);

        if let Some(dir) = env::var(INSTALL_DIR_ENV_VAR).ok().filter(|s| !s.is_empty()) {
            debug!("Install directory overridden by {}: {}", INSTALL_DIR_ENV_VAR, dir);
            config.install_dir = PathBuf::from(dir);
        }
        if let Some(mirror) = env::var(MIRROR_ENV_VAR).ok().filter(|s| !s.trim().is_empty()) {
            debug!("Primary download base overridden by {}: {}", MIRROR_ENV_VAR, mirror);
            config.set_primary_base_url(&mirror);
        }

        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    /// Default configuration rooted at `root`, ignoring the environment.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let rtvm_root = root.into();
        Self {
            install_dir: rtvm_root.join("versions"),
            rtvm_root,
            primary_base_url: DEFAULT_PRIMARY_BASE_URL.to_string(),
            mirror_base_url: DEFAULT_MIRROR_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            layout: RuntimeLayout::default(),
        }
    }

    pub fn set_primary_base_url(&mut self, url: &str) {
        self.primary_base_url = url.trim().trim_end_matches('/').to_string();
    }

    /// Base locations in the order they are tried. The mirror is only listed
    /// when it differs from the primary.
    pub fn base_urls(&self) -> Vec<String> {
        let mut bases = vec![self.primary_base_url.trim_end_matches('/').to_string()];
        let mirror = self.mirror_base_url.trim_end_matches('/').to_string();
        if !bases.contains(&mirror) {
            bases.push(mirror);
        }
        bases
    }

    pub fn catalog_url(&self, base: &str) -> String {
        format!("{}/dl/?mode=json&include=all", base.trim_end_matches('/'))
    }

    pub fn artifact_url(&self, base: &str, filename: &str) -> String {
        format!("{}/dl/{}", base.trim_end_matches('/'), filename)
    }

    pub fn rtvm_root(&self) -> &Path {
        &self.rtvm_root
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.install_dir.join(version)
    }

    pub fn entrypoint_path(&self, version: &str) -> PathBuf {
        self.version_dir(version)
            .join(self.layout.entrypoint_relative_path())
    }

    pub fn state_file(&self) -> PathBuf {
        self.rtvm_root.join(STATE_FILENAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.rtvm_root.join(LOCK_FILENAME)
    }

    pub fn shim_dir(&self) -> PathBuf {
        self.rtvm_root.join("shims")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.rtvm_root.join("downloads")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.rtvm_root.join("logs")
    }

    /// Environment script sourced by the PowerShell profile hook.
    pub fn env_script_path(&self) -> PathBuf {
        self.rtvm_root.join("env.ps1")
    }

    pub fn home_dir(&self) -> PathBuf {
        UserDirs::new().map_or_else(|| PathBuf::from("/"), |ud| ud.home_dir().to_path_buf())
    }
}
