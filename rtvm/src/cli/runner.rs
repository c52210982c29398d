// rtvm/src/cli/runner.rs
//! Runs a manager operation while a render thread draws its pipeline events.
use std::thread;

use rtvm_common::config::Config;
use rtvm_common::error::Result;
use rtvm_common::pipeline::EventEmitter;
use rtvm_core::VersionManager;
use rtvm_net::{HttpDownloader, RemoteCatalog};
use tracing::{debug, warn};

use crate::cli::status;

pub type RemoteManager = VersionManager<RemoteCatalog, HttpDownloader>;

/// Manager without an event consumer, for read-only commands.
pub fn manager(config: &Config) -> Result<RemoteManager> {
    VersionManager::remote(config.clone())
}

/// Builds a manager wired to the status display, runs `operation`, then
/// waits for the display to drain.
///
/// The manager owns the only sender; dropping it at the end of the closure
/// is what ends the render loop.
pub fn run_with_events<T>(
    config: &Config,
    operation: impl FnOnce(&RemoteManager) -> Result<T>,
) -> Result<T> {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let renderer = thread::Builder::new()
        .name("rtvm-status".to_string())
        .spawn(move || status::handle_events(event_rx))?;

    let result = VersionManager::remote(config.clone()).and_then(|manager| {
        let manager = manager.with_events(EventEmitter::new(event_tx));
        operation(&manager)
    });

    debug!("Operation finished, waiting for status display");
    if renderer.join().is_err() {
        warn!("Status display thread panicked");
    }
    result
}
