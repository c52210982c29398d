// rtvm-core/src/manager.rs
//! The version manager ties the catalog, downloader, verifier, extractor,
//! state store and activation together.
//!
//! Durable state is only written once the physical effect it describes is in
//! place: an installation record after the directory validated, the current
//! version after the shims and search path point at it. Every mutating
//! operation runs under [`OperationLock`].
use std::cmp::Ordering;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rtvm_common::config::Config;
use rtvm_common::error::{Result, RtvmError};
use rtvm_common::model::{
    ArchiveFormat, ArtifactDescriptor, InstallState, InstallationRecord, ReleaseEntry,
    SYSTEM_VERSION,
};
use rtvm_common::pipeline::{EventEmitter, InstallStage, PipelineEvent};
use rtvm_common::platform::Platform;
use rtvm_common::version::{compare_versions, normalize_version, LATEST};
use rtvm_net::catalog::{find_release, latest_stable, select_artifact, CatalogSource, RemoteCatalog};
use rtvm_net::http::{ArtifactFetcher, HttpDownloader};
use rtvm_net::retry::with_fallback;
use rtvm_net::validation::{verify_checksum, verify_content_type};
use tracing::{debug, error, info, warn};

use crate::activate::{update_shims, ShimReport};
use crate::extract::extract_archive;
use crate::fs::remove_dir_all_if_exists;
use crate::shell::{ensure_on_path, PathUpdate};
use crate::state::{OperationLock, StateStore};

/// What `current` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentVersion {
    None,
    /// A runtime found on `PATH` outside the rtvm root.
    System(PathBuf),
    Managed(String),
}

/// The artifact chosen for a requested version.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub version: String,
    pub artifact: ArtifactDescriptor,
    pub format: ArchiveFormat,
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub version: String,
    pub path: PathBuf,
    /// False when the catalog published no digest for the artifact.
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    pub version: String,
    pub shims: ShimReport,
    pub path_update: Option<PathUpdate>,
}

pub struct VersionManager<C, F> {
    config: Config,
    catalog: C,
    fetcher: F,
    platform: Platform,
    store: StateStore,
    events: EventEmitter,
    shell_integration: bool,
}

impl VersionManager<RemoteCatalog, HttpDownloader> {
    /// Manager backed by the real catalog and HTTPS downloader.
    pub fn remote(config: Config) -> Result<Self> {
        let catalog = RemoteCatalog::new(&config)?;
        let fetcher = HttpDownloader::new()?;
        Ok(Self::new(config, catalog, fetcher))
    }
}

impl<C: CatalogSource, F: ArtifactFetcher> VersionManager<C, F> {
    pub fn new(config: Config, catalog: C, fetcher: F) -> Self {
        let store = StateStore::new(&config);
        Self {
            config,
            catalog,
            fetcher,
            platform: Platform::current(),
            store,
            events: EventEmitter::disabled(),
            shell_integration: true,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Skips editing shell startup files during activation.
    pub fn without_shell_integration(mut self) -> Self {
        self.shell_integration = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn normalize(&self, input: &str) -> String {
        normalize_version(input, &self.config.layout.version_prefix)
    }

    fn stage(&self, version: &str, stage: InstallStage) {
        debug!("{}: {}", version, stage);
        self.events.emit(PipelineEvent::StageStarted {
            version: version.to_string(),
            stage,
        });
    }

    fn fail(&self, version: &str, stage: InstallStage, err: &RtvmError) {
        error!("Install of {} failed while {}: {}", version, stage, err);
        self.events
            .emit(PipelineEvent::install_failed(version, stage, err));
    }

    /// Looks the requested version up in the catalog and picks the artifact
    /// for this platform. Installed versions are rejected before any network
    /// access when the request names a concrete version.
    pub fn resolve(&self, version: &str, state: &InstallState) -> Result<ResolvedArtifact> {
        if version != LATEST && state.is_installed(version) {
            return Err(RtvmError::AlreadyInstalled(version.to_string()));
        }

        let releases = self.catalog.fetch_catalog()?;
        let release = if version == LATEST {
            latest_stable(&releases)?
        } else {
            find_release(&releases, version)
                .ok_or_else(|| RtvmError::UnknownVersion(version.to_string()))?
        };
        if state.is_installed(&release.version_id) {
            return Err(RtvmError::AlreadyInstalled(release.version_id.clone()));
        }

        let artifact = select_artifact(release, &self.platform)?.clone();
        let format = artifact.archive_format().ok_or_else(|| {
            RtvmError::Format(format!(
                "Unsupported archive format for {} ({})",
                artifact.filename, release.version_id
            ))
        })?;
        debug!(
            "Resolved {} to {} ({} format) for {}",
            version, artifact.filename, format, self.platform
        );
        Ok(ResolvedArtifact {
            version: release.version_id.clone(),
            artifact,
            format,
        })
    }

    pub fn install(&self, requested: &str) -> Result<InstallOutcome> {
        let requested = self.normalize(requested);
        let _lock = OperationLock::acquire(&self.config)?;
        let mut state = self.store.load()?;

        self.stage(&requested, InstallStage::Resolving);
        let resolved = match self.resolve(&requested, &state) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.fail(&requested, InstallStage::Resolving, &e);
                return Err(e);
            }
        };
        let version = resolved.version.clone();
        let install_dir = self.config.version_dir(&version);
        let archive_path = self.config.downloads_dir().join(&resolved.artifact.filename);

        let result = self.run_stages(&resolved, &install_dir, &archive_path);
        self.discard_download(&archive_path);

        let verified = match result {
            Ok(verified) => verified,
            Err((stage, e)) => {
                self.roll_back(&install_dir);
                self.fail(&version, stage, &e);
                return Err(e);
            }
        };

        state.add_record(InstallationRecord::new(&version, &install_dir));
        if let Err(e) = self.store.save(&state) {
            self.roll_back(&install_dir);
            self.fail(&version, InstallStage::Installed, &e);
            return Err(e);
        }

        info!("Installed {} to {}", version, install_dir.display());
        self.events.emit(PipelineEvent::InstallSucceeded {
            version: version.clone(),
            path: install_dir.clone(),
        });
        Ok(InstallOutcome {
            version,
            path: install_dir,
            verified,
        })
    }

    fn run_stages(
        &self,
        resolved: &ResolvedArtifact,
        install_dir: &Path,
        archive_path: &Path,
    ) -> std::result::Result<bool, (InstallStage, RtvmError)> {
        let version = &resolved.version;

        self.stage(version, InstallStage::Downloading);
        self.download(&resolved.artifact, archive_path)
            .map_err(|e| (InstallStage::Downloading, e))?;

        self.stage(version, InstallStage::Verifying);
        let verified = self
            .verify(resolved, archive_path)
            .map_err(|e| (InstallStage::Verifying, e))?;

        self.stage(version, InstallStage::Extracting);
        self.extract(resolved, install_dir, archive_path)
            .map_err(|e| (InstallStage::Extracting, e))?;

        self.stage(version, InstallStage::Validating);
        self.validate_installation(version, install_dir)
            .map_err(|e| (InstallStage::Validating, e))?;

        Ok(verified)
    }

    fn download(&self, artifact: &ArtifactDescriptor, archive_path: &Path) -> Result<()> {
        let total_bytes = Some(artifact.size_bytes).filter(|size| *size > 0);
        let progress: &dyn Fn(u64, Option<u64>) = &|bytes_written, total| {
            self.events.emit(PipelineEvent::DownloadProgress {
                bytes_written,
                total_bytes: total.or(total_bytes),
            });
        };

        with_fallback(
            &self.config.base_urls(),
            &self.config.retry,
            &artifact.filename,
            |base, attempt| {
                let url = self.config.artifact_url(base, &artifact.filename);
                self.events.emit(PipelineEvent::DownloadStarted {
                    url: url.clone(),
                    attempt,
                    total_bytes,
                });
                self.fetcher
                    .fetch(&url, archive_path, Some(progress))
                    .inspect_err(|e| {
                        self.events
                            .emit(PipelineEvent::download_failed(&url, attempt, e));
                    })
            },
        )?;

        let size_bytes = fs::metadata(archive_path)?.len();
        self.events.emit(PipelineEvent::DownloadFinished {
            path: archive_path.to_path_buf(),
            size_bytes,
        });
        Ok(())
    }

    /// Returns whether a digest was actually checked.
    fn verify(&self, resolved: &ResolvedArtifact, archive_path: &Path) -> Result<bool> {
        let artifact = &resolved.artifact;
        let verified = if artifact.has_digest() {
            verify_checksum(archive_path, &artifact.digest)?;
            true
        } else {
            warn!(
                "No checksum published for {}; installing unverified",
                artifact.filename
            );
            self.events.emit(PipelineEvent::VerificationSkipped {
                filename: artifact.filename.clone(),
            });
            false
        };
        verify_content_type(archive_path, resolved.format.detected_extension())?;
        Ok(verified)
    }

    fn extract(
        &self,
        resolved: &ResolvedArtifact,
        install_dir: &Path,
        archive_path: &Path,
    ) -> Result<()> {
        if install_dir.exists() {
            warn!(
                "Removing leftover directory {} from an interrupted install",
                install_dir.display()
            );
            self.events.emit(PipelineEvent::LogWarn {
                message: format!("removed leftover directory {}", install_dir.display()),
            });
            remove_dir_all_if_exists(install_dir)?;
        }
        extract_archive(
            archive_path,
            install_dir,
            resolved.format,
            &self.config.layout.archive_root,
        )
    }

    /// The marker file's first non-empty line must name `version`, and the
    /// entry-point binary must exist.
    pub fn validate_installation(&self, version: &str, install_dir: &Path) -> Result<()> {
        let layout = &self.config.layout;
        let marker = install_dir.join(&layout.marker_file);
        let content = fs::read_to_string(&marker).map_err(|e| {
            RtvmError::Validation(format!(
                "Cannot read {} for {}: {}",
                marker.display(),
                version,
                e
            ))
        })?;
        let found = first_non_empty_line(&content).unwrap_or_default();
        if found != version {
            return Err(RtvmError::Validation(format!(
                "{} names '{}' but {} was requested",
                marker.display(),
                found,
                version
            )));
        }

        let entrypoint = install_dir.join(layout.entrypoint_relative_path());
        if !entrypoint.is_file() {
            return Err(RtvmError::Validation(format!(
                "Entry point {} missing for {}",
                entrypoint.display(),
                version
            )));
        }
        Ok(())
    }

    fn roll_back(&self, install_dir: &Path) {
        match remove_dir_all_if_exists(install_dir) {
            Ok(true) => debug!("Removed partial install {}", install_dir.display()),
            Ok(false) => {}
            Err(e) => warn!(
                "Failed to clean up partial install {}: {}",
                install_dir.display(),
                e
            ),
        }
    }

    fn discard_download(&self, archive_path: &Path) {
        if let Err(e) = fs::remove_file(archive_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    "Failed to delete downloaded archive {}: {}",
                    archive_path.display(),
                    e
                );
            }
        }
    }

    /// Makes an installed version the active one. `latest` picks the newest
    /// installed version.
    pub fn use_version(&self, requested: &str) -> Result<ActivationOutcome> {
        let requested = self.normalize(requested);
        let _lock = OperationLock::acquire(&self.config)?;
        let mut state = self.store.load()?;

        let version = if requested == LATEST {
            self.newest_installed(&state)
                .ok_or_else(|| RtvmError::NotInstalled(LATEST.to_string()))?
        } else {
            requested
        };
        let record = state
            .record(&version)
            .cloned()
            .ok_or_else(|| RtvmError::NotInstalled(version.clone()))?;
        if !record.install_path.is_dir() {
            warn!(
                "Installation directory {} for {} is missing",
                record.install_path.display(),
                version
            );
            return Err(RtvmError::NotInstalled(version));
        }

        let shims = update_shims(&self.config, &record.install_path)?;
        let path_update = if self.shell_integration {
            let update = ensure_on_path(&self.config)?;
            if update == PathUpdate::Unsupported {
                self.events.emit(PipelineEvent::LogWarn {
                    message: format!(
                        "add {} to your PATH to use the active version",
                        self.config.shim_dir().display()
                    ),
                });
            }
            Some(update)
        } else {
            None
        };

        state.set_current(&version);
        self.store.save(&state)?;

        info!("Activated {}", version);
        self.events.emit(PipelineEvent::Activated {
            version: version.clone(),
        });
        Ok(ActivationOutcome {
            version,
            shims,
            path_update,
        })
    }

    fn newest_installed(&self, state: &InstallState) -> Option<String> {
        let prefix = &self.config.layout.version_prefix;
        state
            .versions
            .keys()
            .max_by(|a, b| compare_versions(a, b, prefix))
            .cloned()
    }

    /// Removes an installed, non-active version. Returns the removed path.
    pub fn uninstall(&self, requested: &str) -> Result<PathBuf> {
        let version = self.normalize(requested);
        let _lock = OperationLock::acquire(&self.config)?;
        let mut state = self.store.load()?;

        let record = state
            .record(&version)
            .cloned()
            .ok_or_else(|| RtvmError::NotInstalled(version.clone()))?;
        if state.is_current(&version) {
            return Err(RtvmError::ActiveVersionInUse(version));
        }

        if !remove_dir_all_if_exists(&record.install_path)? {
            warn!(
                "Installation directory {} was already gone; dropping the record",
                record.install_path.display()
            );
        }
        state.remove_record(&version);
        self.store.save(&state)?;

        info!("Uninstalled {}", version);
        self.events.emit(PipelineEvent::Uninstalled {
            version: version.clone(),
        });
        Ok(record.install_path)
    }

    pub fn installation(&self, requested: &str) -> Result<Option<InstallationRecord>> {
        let version = self.normalize(requested);
        Ok(self.store.load()?.record(&version).cloned())
    }

    /// Installed versions, active first, then newest first.
    pub fn list_installed(&self) -> Result<Vec<InstallationRecord>> {
        let state = self.store.load()?;
        let prefix = &self.config.layout.version_prefix;
        let mut records: Vec<InstallationRecord> = state.versions.into_values().collect();
        records.sort_by(|a, b| match (a.is_active, b.is_active) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => compare_versions(&b.version_id, &a.version_id, prefix),
        });
        Ok(records)
    }

    /// Catalog entries in catalog order.
    pub fn list_available(
        &self,
        stable_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<ReleaseEntry>> {
        let releases = self.catalog.fetch_catalog()?;
        Ok(releases
            .into_iter()
            .filter(|release| !stable_only || release.is_stable)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    pub fn current(&self) -> Result<CurrentVersion> {
        let state = self.store.load()?;
        if !state.current_version.is_empty() && state.current_version != SYSTEM_VERSION {
            return Ok(CurrentVersion::Managed(state.current_version));
        }
        Ok(self
            .system_entrypoint()
            .map_or(CurrentVersion::None, CurrentVersion::System))
    }

    /// First entry-point binary on `PATH` that is not one of our shims.
    pub fn system_entrypoint(&self) -> Option<PathBuf> {
        let root = self.config.rtvm_root();
        which::which_all(&self.config.layout.entrypoint)
            .ok()?
            .find(|path| !path.starts_with(root))
    }

    /// Version of a runtime installed outside rtvm, read from the marker file
    /// under `$<ENTRYPOINT>ROOT` or next to the binary found on `PATH`.
    pub fn detect_system_version(&self) -> Option<String> {
        let layout = &self.config.layout;
        let root_var = format!("{}ROOT", layout.entrypoint.to_uppercase());
        if let Some(root) = env::var_os(&root_var).filter(|v| !v.is_empty()) {
            let root = PathBuf::from(root);
            if !root.starts_with(self.config.rtvm_root()) {
                if let Some(version) = read_marker(&root.join(&layout.marker_file)) {
                    return Some(version);
                }
            }
        }

        let binary = self.system_entrypoint()?;
        let binary = fs::canonicalize(&binary).unwrap_or(binary);
        let runtime_root = binary.parent()?.parent()?;
        read_marker(&runtime_root.join(&layout.marker_file))
    }
}

fn first_non_empty_line(content: &str) -> Option<&str> {
    content.lines().map(str::trim).find(|line| !line.is_empty())
}

fn read_marker(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    first_non_empty_line(&content).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_uses_first_non_empty_line() {
        assert_eq!(
            first_non_empty_line("\n  go1.21.5 \ntime 2023-12-05T20:19:48Z\n"),
            Some("go1.21.5")
        );
        assert_eq!(first_non_empty_line("\n\n"), None);
    }

    #[test]
    fn read_marker_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_marker(&dir.path().join("VERSION")), None);
        fs::write(dir.path().join("VERSION"), "go1.22.0\n").unwrap();
        assert_eq!(
            read_marker(&dir.path().join("VERSION")),
            Some("go1.22.0".to_string())
        );
    }
}
