// rtvm-core/src/fs.rs
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use rtvm_common::error::{Result, RtvmError};
use tempfile::NamedTempFile;
use tracing::{debug, error};

/// Writes `content` to a temp file beside `original_path`, syncs it, then
/// renames it over the original. Existing permissions are kept.
pub fn atomic_write_file(original_path: &Path, content: &[u8]) -> Result<()> {
    let dir = original_path.parent().ok_or_else(|| {
        RtvmError::IoError(format!(
            "Cannot get parent directory for {}",
            original_path.display()
        ))
    })?;
    fs::create_dir_all(dir)?;

    let original_perms = fs::metadata(original_path).map(|m| m.permissions()).ok();

    let mut temp_file = NamedTempFile::new_in(dir)?;
    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        original_path.display(),
        temp_file.path().display()
    );
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(original_path).map_err(|e| {
        error!(
            "Failed to persist temporary file over {}: {}",
            original_path.display(),
            e.error
        );
        RtvmError::from(e.error)
    })?;

    if let Some(perms) = original_perms {
        fs::set_permissions(original_path, perms)?;
    }
    Ok(())
}

/// Removes a directory tree; a path that is already gone is not an error.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RtvmError::IoError(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
