// rtvm-common/src/pipeline.rs
use std::fmt;
use std::path::PathBuf;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::error::RtvmError;

/// Stages of a single install. `Failed` is reported through
/// [`PipelineEvent::InstallFailed`] together with the stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallStage {
    Resolving,
    Downloading,
    Verifying,
    Extracting,
    Validating,
    Installed,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::Validating => "validating",
            Self::Installed => "installed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    StageStarted {
        version: String,
        stage: InstallStage,
    },
    DownloadStarted {
        url: String,
        attempt: u32,
        total_bytes: Option<u64>,
    },
    DownloadProgress {
        bytes_written: u64,
        total_bytes: Option<u64>,
    },
    DownloadFinished {
        path: PathBuf,
        size_bytes: u64,
    },
    DownloadFailed {
        url: String,
        attempt: u32,
        error: String,
    },
    VerificationSkipped {
        filename: String,
    },
    InstallSucceeded {
        version: String,
        path: PathBuf,
    },
    InstallFailed {
        version: String,
        stage: InstallStage,
        error: String, // Keep as String
    },
    Activated {
        version: String,
    },
    Uninstalled {
        version: String,
    },
    LogWarn {
        message: String,
    },
}

impl PipelineEvent {
    pub fn install_failed(version: &str, stage: InstallStage, error: &RtvmError) -> Self {
        PipelineEvent::InstallFailed {
            version: version.to_string(),
            stage,
            error: error.to_string(),
        }
    }

    pub fn download_failed(url: &str, attempt: u32, error: &RtvmError) -> Self {
        PipelineEvent::DownloadFailed {
            url: url.to_string(),
            attempt,
            error: error.to_string(),
        }
    }
}

/// Fire-and-forget sender for pipeline events. Dropping the last emitter
/// closes the channel, which is how the console learns the pipeline is done.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<Sender<PipelineEvent>>,
}

impl EventEmitter {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // A gone receiver only means nobody is rendering.
            tx.send(event).ok();
        }
    }
}
