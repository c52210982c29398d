// rtvm-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod platform;
pub mod version;

// Re-export key types
pub use config::Config;
pub use error::{Result, RtvmError};
pub use model::{ArchiveFormat, ArtifactDescriptor, InstallState, InstallationRecord, ReleaseEntry};
pub use platform::Platform;
