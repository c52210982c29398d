// rtvm-common/src/model/release.rs
use serde::{Deserialize, Serialize};

use super::artifact::ArtifactDescriptor;

/// A published release and its per-platform artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseEntry {
    #[serde(rename = "version")]
    pub version_id: String,
    #[serde(rename = "stable", default)]
    pub is_stable: bool,
    #[serde(rename = "files", default)]
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl ReleaseEntry {
    /// Exact OS/arch match; the first matching artifact in catalog order wins.
    pub fn artifact_for(&self, os: &str, arch: &str) -> Option<&ArtifactDescriptor> {
        self.artifacts
            .iter()
            .find(|artifact| artifact.os == os && artifact.arch == arch)
    }
}
