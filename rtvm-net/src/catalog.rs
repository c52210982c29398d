// rtvm-net/src/catalog.rs
use reqwest::blocking::Client;
use rtvm_common::config::Config;
use rtvm_common::error::{Result, RtvmError};
use rtvm_common::model::{ArtifactDescriptor, ReleaseEntry};
use rtvm_common::platform::Platform;
use tracing::debug;

use crate::http::build_http_client;
use crate::retry::with_fallback;
use crate::validation::validate_url;

/// Anything that can produce the release catalog, newest release first.
pub trait CatalogSource {
    fn fetch_catalog(&self) -> Result<Vec<ReleaseEntry>>;

    /// Version id of the first stable entry in catalog order.
    fn resolve_latest_stable(&self) -> Result<String> {
        let releases = self.fetch_catalog()?;
        latest_stable(&releases).map(|release| release.version_id.clone())
    }
}

/// Catalog served over HTTP by the primary base, with mirror fallback.
pub struct RemoteCatalog {
    client: Client,
    config: Config,
}

impl RemoteCatalog {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            config: config.clone(),
        })
    }

    fn fetch_from(&self, base: &str) -> Result<Vec<ReleaseEntry>> {
        let url = self.config.catalog_url(base);
        validate_url(&url)?;
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| RtvmError::Network(url.clone(), e.to_string()))?;
        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);
        if !status.is_success() {
            return Err(RtvmError::Network(url, format!("bad status: {status}")));
        }
        let body = response
            .text()
            .map_err(|e| RtvmError::Network(url.clone(), format!("failed to read body: {e}")))?;
        parse_catalog(&body).map_err(|e| match e {
            RtvmError::Parse(what, msg) => RtvmError::Parse(what, format!("{url}: {msg}")),
            other => other,
        })
    }
}

impl CatalogSource for RemoteCatalog {
    fn fetch_catalog(&self) -> Result<Vec<ReleaseEntry>> {
        let releases = with_fallback(
            &self.config.base_urls(),
            &self.config.retry,
            "release catalog",
            |base, _attempt| self.fetch_from(base),
        )?;
        debug!("Fetched release catalog with {} entries", releases.len());
        Ok(releases)
    }
}

pub fn parse_catalog(body: &str) -> Result<Vec<ReleaseEntry>> {
    serde_json::from_str::<Vec<ReleaseEntry>>(body)
        .map_err(|e| RtvmError::Parse("release catalog", e.to_string()))
}

pub fn find_release<'a>(releases: &'a [ReleaseEntry], version: &str) -> Option<&'a ReleaseEntry> {
    releases.iter().find(|release| release.version_id == version)
}

/// First stable release in catalog order; the catalog is newest-first, so no
/// re-sorting happens here.
pub fn latest_stable(releases: &[ReleaseEntry]) -> Result<&ReleaseEntry> {
    releases
        .iter()
        .find(|release| release.is_stable)
        .ok_or_else(|| RtvmError::NotFound("no stable versions found in the catalog".to_string()))
}

pub fn select_artifact<'a>(
    release: &'a ReleaseEntry,
    platform: &Platform,
) -> Result<&'a ArtifactDescriptor> {
    release
        .artifact_for(&platform.os, &platform.arch)
        .ok_or_else(|| {
            RtvmError::NoSuitableArtifact(release.version_id.clone(), platform.to_string())
        })
}
