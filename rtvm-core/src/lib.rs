// rtvm-core/src/lib.rs
pub mod activate;
pub mod extract;
pub mod fs;
pub mod manager;
pub mod shell;
pub mod state;

pub use manager::{ActivationOutcome, CurrentVersion, InstallOutcome, VersionManager};
pub use shell::PathUpdate;
pub use state::{OperationLock, StateStore};
