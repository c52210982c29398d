// rtvm-common/src/model/installation.rs
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sentinel current version meaning "a runtime not managed by rtvm".
pub const SYSTEM_VERSION: &str = "system";

/// One locally installed version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallationRecord {
    pub version_id: String,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub is_active: bool,
}

impl InstallationRecord {
    pub fn new(version_id: impl Into<String>, install_path: impl Into<PathBuf>) -> Self {
        Self {
            version_id: version_id.into(),
            install_path: install_path.into(),
            installed_at: Utc::now(),
            is_active: false,
        }
    }
}

/// The persisted document: installed versions plus the current one.
///
/// `current_version` is empty, [`SYSTEM_VERSION`], or a key of `versions`,
/// and at most one record has `is_active` set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstallState {
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub install_dir: PathBuf,
    #[serde(default)]
    pub versions: BTreeMap<String, InstallationRecord>,
}

impl InstallState {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            current_version: String::new(),
            install_dir: install_dir.into(),
            versions: BTreeMap::new(),
        }
    }

    pub fn is_installed(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }

    pub fn record(&self, version: &str) -> Option<&InstallationRecord> {
        self.versions.get(version)
    }

    pub fn is_current(&self, version: &str) -> bool {
        !version.is_empty() && self.current_version == version
    }

    pub fn active_record(&self) -> Option<&InstallationRecord> {
        self.versions.get(&self.current_version)
    }

    /// Inserts a freshly installed, inactive record.
    pub fn add_record(&mut self, mut record: InstallationRecord) {
        record.is_active = self.is_current(&record.version_id);
        self.versions.insert(record.version_id.clone(), record);
    }

    /// Drops a record. Clears `current_version` if it named this version.
    pub fn remove_record(&mut self, version: &str) -> Option<InstallationRecord> {
        let removed = self.versions.remove(version);
        if self.current_version == version {
            self.current_version.clear();
        }
        removed
    }

    /// Marks `version` as current and flips `is_active` so exactly that record
    /// (or none, for empty and [`SYSTEM_VERSION`]) is active.
    pub fn set_current(&mut self, version: &str) {
        for (id, record) in self.versions.iter_mut() {
            record.is_active = id == version;
        }
        self.current_version = version.to_string();
    }

    /// Repairs a document that violates its invariants, e.g. after a manual
    /// edit. Returns true when something changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        if !self.current_version.is_empty()
            && self.current_version != SYSTEM_VERSION
            && !self.versions.contains_key(&self.current_version)
        {
            warn!(
                "Current version '{}' has no installation record; clearing it.",
                self.current_version
            );
            self.current_version.clear();
            changed = true;
        }
        let current = self.current_version.clone();
        for (id, record) in self.versions.iter_mut() {
            let should_be_active = *id == current;
            if record.is_active != should_be_active {
                record.is_active = should_be_active;
                changed = true;
            }
            if record.version_id != *id {
                record.version_id = id.clone();
                changed = true;
            }
        }
        changed
    }
}
