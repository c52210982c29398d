// rtvm/src/cli/status.rs
use std::time::{Duration, Instant};

use colored::*;
use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};
use rtvm_common::pipeline::{InstallStage, PipelineEvent};

const SPINNER_TEMPLATE: &str = "{spinner:.blue.bold} {msg}";
const BAR_TEMPLATE: &str = "  {spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes}";
const TICK: Duration = Duration::from_millis(100);

fn stage_label(stage: InstallStage) -> &'static str {
    match stage {
        InstallStage::Resolving => "Resolving",
        InstallStage::Downloading => "Downloading",
        InstallStage::Verifying => "Verifying",
        InstallStage::Extracting => "Extracting",
        InstallStage::Validating => "Validating",
        InstallStage::Installed => "Installed",
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit_idx = 0;

    while value >= 1000.0 && unit_idx < UNITS.len() - 1 {
        value /= 1000.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{bytes}B")
    } else {
        format!("{:.1}{}", value, UNITS[unit_idx])
    }
}

fn file_name(url: &str) -> &str {
    url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(url)
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(TICK);
    pb
}

fn download_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.enable_steady_tick(TICK);
    pb
}

/// One live indicator at a time: a spinner for stages, a bar for downloads.
struct StatusDisplay {
    bar: Option<ProgressBar>,
    download_started: Option<Instant>,
}

impl StatusDisplay {
    fn new() -> Self {
        Self {
            bar: None,
            download_started: None,
        }
    }

    fn replace(&mut self, pb: ProgressBar) -> &ProgressBar {
        self.clear();
        self.bar.insert(pb)
    }

    fn clear(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }

    /// Prints a line above the live indicator. `suspend` keeps output working
    /// when the bar is hidden because stderr is not a terminal.
    fn log(&self, line: String) {
        match &self.bar {
            Some(pb) => pb.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }

    fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { version, stage } => {
                let message = format!("{} {}...", stage_label(stage), version.cyan());
                self.replace(spinner()).set_message(message);
            }
            PipelineEvent::DownloadStarted {
                url,
                attempt,
                total_bytes,
            } => {
                let name = file_name(&url).to_string();
                let message = if attempt > 1 {
                    format!("{name} (attempt {attempt})")
                } else {
                    name
                };
                let pb = match total_bytes {
                    Some(total) if total > 0 => download_bar(total),
                    _ => spinner(),
                };
                self.replace(pb).set_message(message);
                self.download_started = Some(Instant::now());
            }
            PipelineEvent::DownloadProgress {
                bytes_written,
                total_bytes,
            } => {
                if let Some(pb) = &self.bar {
                    if let Some(total) = total_bytes {
                        pb.set_length(total);
                    }
                    pb.set_position(bytes_written);
                }
            }
            PipelineEvent::DownloadFinished { path, size_bytes } => {
                self.clear();
                let elapsed = self
                    .download_started
                    .take()
                    .map(|started| started.elapsed().as_secs_f64())
                    .unwrap_or_default();
                self.log(format!(
                    "{} Downloaded {} ({}, {:.1}s)",
                    "✓".green(),
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    format_bytes(size_bytes),
                    elapsed
                ));
            }
            PipelineEvent::DownloadFailed {
                url,
                attempt,
                error,
            } => {
                self.log(format!(
                    "{} {} (attempt {}): {}",
                    "Download failed:".yellow(),
                    url,
                    attempt,
                    error.red()
                ));
            }
            PipelineEvent::VerificationSkipped { filename } => {
                self.log(format!(
                    "{} no checksum published for {}, skipping verification",
                    "Warning:".yellow().bold(),
                    filename
                ));
            }
            PipelineEvent::InstallSucceeded { .. } => {
                self.clear();
            }
            PipelineEvent::InstallFailed {
                version,
                stage,
                error,
            } => {
                self.clear();
                self.log(format!(
                    "{} {} failed while {}: {}",
                    "✗".red().bold(),
                    version.cyan(),
                    stage,
                    error.red()
                ));
            }
            PipelineEvent::LogWarn { message } => {
                self.log(message.yellow().to_string());
            }
            PipelineEvent::Activated { .. } | PipelineEvent::Uninstalled { .. } => {}
        }
    }
}

/// Renders events until every sender is gone.
pub fn handle_events(event_rx: Receiver<PipelineEvent>) {
    let mut display = StatusDisplay::new();
    for event in event_rx.iter() {
        display.handle(event);
    }
    display.clear();
}
