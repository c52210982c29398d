// src/model/mod.rs
// Declares the modules within the model directory.

pub mod artifact;
pub mod installation;
pub mod release;

// Re-export
pub use artifact::{ArchiveFormat, ArtifactDescriptor};
pub use installation::{InstallState, InstallationRecord, SYSTEM_VERSION};
pub use release::ReleaseEntry;
