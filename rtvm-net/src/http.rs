// rtvm-net/src/http.rs
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use rtvm_common::error::{Result, RtvmError};
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, warn};

use crate::validation::validate_url;

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "rtvm runtime version manager (Rust)";
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Receives `(bytes_so_far, total_bytes_if_known)`.
pub type ProgressSink<'a> = &'a dyn Fn(u64, Option<u64>);

/// Moves a finished temp file onto its destination.
pub type RenameFn = fn(&Path, &Path) -> io::Result<()>;

/// Downloads one URL to a local path. Implementations either leave a complete
/// file at `dest` or leave `dest` untouched.
pub trait ArtifactFetcher {
    fn fetch(&self, url: &str, dest: &Path, progress: Option<ProgressSink<'_>>) -> Result<()>;
}

pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| RtvmError::Config(format!("Failed to build HTTP client: {e}")))
}

fn rename_file(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

/// Streaming HTTPS downloader writing through a temp file next to the
/// destination.
pub struct HttpDownloader {
    client: Client,
    rename: RenameFn,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            rename: rename_file,
        })
    }

    /// Replaces the final rename step, e.g. to simulate cross-device moves.
    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }
}

impl ArtifactFetcher for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path, progress: Option<ProgressSink<'_>>) -> Result<()> {
        validate_url(url)?;
        let parent = dest.parent().ok_or_else(|| {
            RtvmError::IoError(format!("Download target {} has no parent", dest.display()))
        })?;
        fs::create_dir_all(parent).map_err(|e| {
            RtvmError::IoError(format!(
                "Failed to create download directory {}: {}",
                parent.display(),
                e
            ))
        })?;

        debug!("Downloading {} -> {}", url, dest.display());
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| RtvmError::Network(url.to_string(), e.to_string()))?;
        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);
        if !status.is_success() {
            return Err(RtvmError::Network(
                url.to_string(),
                format!("bad status: {status}"),
            ));
        }
        let total = response.content_length();
        store_body(&mut response, total, url, dest, progress, self.rename)?;
        Ok(())
    }
}

/// Streams `body` into a temp file beside `dest`, then moves it into place.
/// On any error the temp file is dropped and `dest` is left as it was.
pub fn store_body<R: Read>(
    body: &mut R,
    total: Option<u64>,
    url: &str,
    dest: &Path,
    progress: Option<ProgressSink<'_>>,
    rename: RenameFn,
) -> Result<u64> {
    let parent = dest.parent().ok_or_else(|| {
        RtvmError::IoError(format!("Download target {} has no parent", dest.display()))
    })?;
    let mut temp = NamedTempFile::new_in(parent)?;
    let mut throttle = ThrottledProgress::new(progress, PROGRESS_INTERVAL);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut downloaded: u64 = 0;
    loop {
        let n = body.read(&mut buffer).map_err(|e| {
            RtvmError::Network(url.to_string(), format!("failed to read body: {e}"))
        })?;
        if n == 0 {
            break;
        }
        temp.write_all(&buffer[..n])?;
        downloaded += n as u64;
        throttle.update(downloaded, total);
    }
    if let Some(expected) = total {
        if downloaded < expected {
            return Err(RtvmError::Network(
                url.to_string(),
                format!("body truncated after {downloaded} of {expected} bytes"),
            ));
        }
    }
    temp.flush()?;
    temp.as_file().sync_all()?;
    throttle.finish(downloaded, total);

    let outcome = persist_with(temp.into_temp_path(), dest, rename)?;
    debug!(
        "Stored {} bytes at {} ({:?})",
        downloaded,
        dest.display(),
        outcome
    );
    Ok(downloaded)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Renamed,
    Copied,
}

/// Moves `temp` onto `dest`, replacing any existing file. A failed rename
/// (typically across filesystems) falls back to copy-then-delete.
pub fn persist_with(temp: TempPath, dest: &Path, rename: RenameFn) -> Result<PersistOutcome> {
    if dest.exists() {
        fs::remove_file(dest).map_err(|e| {
            RtvmError::IoError(format!(
                "Failed to remove existing file {}: {}",
                dest.display(),
                e
            ))
        })?;
    }

    match rename(&temp, dest) {
        Ok(()) => {
            // The temp path is gone now; stop it from being deleted on drop.
            temp.keep().map_err(|e| RtvmError::IoError(e.error.to_string()))?;
            Ok(PersistOutcome::Renamed)
        }
        Err(rename_err) => {
            warn!(
                "Rename of {} to {} failed ({}); copying instead",
                temp.display(),
                dest.display(),
                rename_err
            );
            if let Err(copy_err) = fs::copy(&temp, dest) {
                let _ = fs::remove_file(dest);
                return Err(RtvmError::IoError(format!(
                    "Failed to copy {} to {}: {}",
                    temp.display(),
                    dest.display(),
                    copy_err
                )));
            }
            temp.close()?;
            Ok(PersistOutcome::Copied)
        }
    }
}

/// Forwards progress to a sink at most once per interval, plus a final update.
pub struct ThrottledProgress<'a> {
    sink: Option<ProgressSink<'a>>,
    interval: Duration,
    last_emit: Option<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(sink: Option<ProgressSink<'a>>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            last_emit: None,
        }
    }

    pub fn update(&mut self, done: u64, total: Option<u64>) {
        self.update_at(done, total, Instant::now());
    }

    fn update_at(&mut self, done: u64, total: Option<u64>, now: Instant) {
        let Some(sink) = self.sink else { return };
        let due = self
            .last_emit
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            sink(done, total);
            self.last_emit = Some(now);
        }
    }

    pub fn finish(&mut self, done: u64, total: Option<u64>) {
        if let Some(sink) = self.sink {
            sink(done, total);
        }
    }
}
