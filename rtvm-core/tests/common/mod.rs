#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use crossbeam_channel::Receiver;
use flate2::write::GzEncoder;
use flate2::Compression;
use rtvm_common::config::{Config, RetryPolicy};
use rtvm_common::error::{Result, RtvmError};
use rtvm_common::model::{ArtifactDescriptor, ReleaseEntry};
use rtvm_common::pipeline::{EventEmitter, PipelineEvent};
use rtvm_common::platform::Platform;
use rtvm_core::VersionManager;
use rtvm_net::catalog::CatalogSource;
use rtvm_net::http::{ArtifactFetcher, ProgressSink};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const PRIMARY: &str = "https://go.dev";
pub const MIRROR: &str = "https://golang.google.cn";

pub fn linux_amd64() -> Platform {
    Platform::new("linux", "amd64")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn entrypoint() -> String {
    format!("go{}", std::env::consts::EXE_SUFFIX)
}

/// A tar.gz laid out like an upstream release: everything under `go/`.
pub fn go_tarball(marker_version: &str) -> Vec<u8> {
    let entries: Vec<(String, Vec<u8>, u32)> = vec![
        (
            "go/VERSION".to_string(),
            format!("{marker_version}\ntime 2024-02-06T17:21:45Z\n").into_bytes(),
            0o644,
        ),
        (format!("go/bin/{}", entrypoint()), b"#!/bin/sh\necho go\n".to_vec(), 0o755),
        ("go/bin/gofmt".to_string(), b"#!/bin/sh\necho gofmt\n".to_vec(), 0o755),
        ("go/src/fmt/print.go".to_string(), b"package fmt\n".to_vec(), 0o644),
        ("go/LICENSE".to_string(), b"BSD-style\n".to_vec(), 0o644),
    ];
    tarball(&entries)
}

/// A release tarball whose marker is right but which ships no entry point.
pub fn go_tarball_without_entrypoint(marker_version: &str) -> Vec<u8> {
    tarball(&[
        (
            "go/VERSION".to_string(),
            format!("{marker_version}\n").into_bytes(),
            0o644,
        ),
        ("go/bin/gofmt".to_string(), b"#!/bin/sh\n".to_vec(), 0o755),
    ])
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn tarball(entries: &[(String, Vec<u8>, u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn go_zip(marker_version: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let exec = SimpleFileOptions::default().unix_permissions(0o755);
    writer.start_file("go/VERSION", SimpleFileOptions::default()).unwrap();
    writer.write_all(marker_version.as_bytes()).unwrap();
    writer.start_file(format!("go/bin/{}", entrypoint()), exec).unwrap();
    writer.write_all(b"MZ").unwrap();
    writer.finish().unwrap().into_inner()
}

pub fn artifact(filename: &str, os: &str, arch: &str, bytes: &[u8]) -> ArtifactDescriptor {
    ArtifactDescriptor {
        filename: filename.to_string(),
        os: os.to_string(),
        arch: arch.to_string(),
        digest: sha256_hex(bytes),
        size_bytes: bytes.len() as u64,
        kind: Some("archive".to_string()),
    }
}

pub fn release(version: &str, stable: bool, artifacts: Vec<ArtifactDescriptor>) -> ReleaseEntry {
    ReleaseEntry {
        version_id: version.to_string(),
        is_stable: stable,
        artifacts,
    }
}

#[derive(Clone, Default)]
pub struct FakeCatalog {
    pub releases: Vec<ReleaseEntry>,
    pub fetches: Rc<RefCell<usize>>,
}

impl CatalogSource for FakeCatalog {
    fn fetch_catalog(&self) -> Result<Vec<ReleaseEntry>> {
        *self.fetches.borrow_mut() += 1;
        Ok(self.releases.clone())
    }
}

/// Serves archives by file name and records every requested URL.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    pub files: HashMap<String, Vec<u8>>,
    pub failing_bases: Vec<String>,
    pub calls: Rc<RefCell<Vec<String>>>,
}

impl ArtifactFetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path, progress: Option<ProgressSink<'_>>) -> Result<()> {
        self.calls.borrow_mut().push(url.to_string());
        if self.failing_bases.iter().any(|base| url.starts_with(base.as_str())) {
            return Err(RtvmError::Network(url.to_string(), "connection refused".into()));
        }
        let name = url.rsplit('/').next().unwrap_or_default();
        let bytes = self
            .files
            .get(name)
            .ok_or_else(|| RtvmError::Network(url.to_string(), "bad status: 404 Not Found".into()))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, bytes)?;
        if let Some(progress) = progress {
            progress(bytes.len() as u64, Some(bytes.len() as u64));
        }
        Ok(())
    }
}

pub struct Harness {
    pub root: TempDir,
    pub config: Config,
    pub catalog: FakeCatalog,
    pub fetcher: FakeFetcher,
    pub events: Receiver<PipelineEvent>,
    pub manager: VersionManager<FakeCatalog, FakeFetcher>,
}

impl Harness {
    pub fn new(releases: Vec<ReleaseEntry>, files: Vec<(&str, Vec<u8>)>) -> Self {
        Self::with_platform(releases, files, linux_amd64())
    }

    pub fn with_platform(
        releases: Vec<ReleaseEntry>,
        files: Vec<(&str, Vec<u8>)>,
        platform: Platform,
    ) -> Self {
        Self::build(releases, files, platform, Vec::new())
    }

    pub fn build(
        releases: Vec<ReleaseEntry>,
        files: Vec<(&str, Vec<u8>)>,
        platform: Platform,
        failing_bases: Vec<String>,
    ) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::with_root(root.path());
        config.retry = RetryPolicy::immediate(3);

        let catalog = FakeCatalog {
            releases,
            ..FakeCatalog::default()
        };
        let fetcher = FakeFetcher {
            files: files
                .into_iter()
                .map(|(name, bytes)| (name.to_string(), bytes))
                .collect(),
            failing_bases,
            ..FakeFetcher::default()
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        let manager = VersionManager::new(config.clone(), catalog.clone(), fetcher.clone())
            .with_platform(platform)
            .with_events(EventEmitter::new(tx))
            .without_shell_integration();

        Self {
            root,
            config,
            catalog,
            fetcher,
            events: rx,
            manager,
        }
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetcher.calls.borrow().clone()
    }

    pub fn drain_events(&self) -> Vec<PipelineEvent> {
        self.events.try_iter().collect()
    }

    pub fn install_dir_entries(&self) -> usize {
        fs::read_dir(self.config.install_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn download_dir_entries(&self) -> usize {
        fs::read_dir(self.config.downloads_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Catalog with a single linux/amd64 tarball for `version`.
pub fn single_release(version: &str) -> Harness {
    let bytes = go_tarball(version);
    let filename = format!("{version}.linux-amd64.tar.gz");
    let releases = vec![release(
        version,
        true,
        vec![artifact(&filename, "linux", "amd64", &bytes)],
    )];
    Harness::new(releases, vec![(filename.as_str(), bytes)])
}
