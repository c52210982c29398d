// rtvm-common/src/model/artifact.rs
use std::fmt;

use serde::{Deserialize, Serialize};

/// One downloadable file of a release, for a single OS/architecture pair.
///
/// Field names follow the remote catalog (`sha256`, `size`), so the type
/// round-trips through the catalog's JSON unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub filename: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    /// Hex SHA-256 of the file. Empty when the catalog publishes none.
    #[serde(default, rename = "sha256")]
    pub digest: String,
    #[serde(default, rename = "size")]
    pub size_bytes: u64,
    /// Catalog classification (`archive`, `installer`, `source`); informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ArtifactDescriptor {
    pub fn has_digest(&self) -> bool {
        !self.digest.trim().is_empty()
    }

    pub fn archive_format(&self) -> Option<ArchiveFormat> {
        ArchiveFormat::from_filename(&self.filename)
    }
}

/// Container formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Chooses the format from the artifact's file extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Extension reported by content sniffing for this container.
    pub fn detected_extension(&self) -> &'static str {
        match self {
            Self::TarGz => "gz",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TarGz => write!(f, "tar.gz"),
            Self::Zip => write!(f, "zip"),
        }
    }
}
