// rtvm-core/src/activate.rs
//! Shim directory maintenance. Each shim is a fixed-location indirection to
//! one executable of the active installation.
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rtvm_common::config::Config;
use rtvm_common::error::{Result, RtvmError};
use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShimReport {
    pub linked: Vec<String>,
    pub removed: Vec<String>,
}

/// Points the shim directory at the executables of `version_dir/bin`.
pub fn update_shims(config: &Config, version_dir: &Path) -> Result<ShimReport> {
    let shim_dir = config.shim_dir();
    fs::create_dir_all(&shim_dir).map_err(|e| {
        RtvmError::IoError(format!(
            "Failed to create shim directory {}: {}",
            shim_dir.display(),
            e
        ))
    })?;

    let bin_dir = version_dir.join("bin");
    let mut executables = collect_executables(&bin_dir)?;
    executables.insert(config.layout.entrypoint_filename());

    let mut report = ShimReport::default();
    let mut wanted = BTreeSet::new();
    for file_name in &executables {
        let target = bin_dir.join(file_name);
        let shim_name = platform::write_shim(&shim_dir, file_name, &target)?;
        debug!("Shim {} -> {}", shim_name, target.display());
        wanted.insert(shim_name.clone());
        report.linked.push(shim_name);
    }

    for existing in platform::existing_shims(&shim_dir)? {
        if !wanted.contains(&existing) {
            let path = shim_dir.join(&existing);
            fs::remove_file(&path).map_err(|e| {
                RtvmError::IoError(format!(
                    "Failed to remove stale shim {}: {}",
                    path.display(),
                    e
                ))
            })?;
            debug!("Removed stale shim {}", path.display());
            report.removed.push(existing);
        }
    }
    Ok(report)
}

fn collect_executables(bin_dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let entries = match fs::read_dir(bin_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(e) => {
            return Err(RtvmError::IoError(format!(
                "Failed to read {}: {}",
                bin_dir.display(),
                e
            )))
        }
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_file() && platform::is_executable(&path) {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Resolves a shim back to the executable it points at.
pub fn shim_target(config: &Config, name: &str) -> Option<PathBuf> {
    platform::read_shim(&config.shim_dir(), name)
}

#[cfg(unix)]
mod platform {
    use std::fs;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use std::path::{Path, PathBuf};

    use rtvm_common::error::{Result, RtvmError};

    pub fn is_executable(path: &Path) -> bool {
        fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    /// Symlink under a temporary name, then rename over the old shim so the
    /// switch is atomic per shim.
    pub fn write_shim(shim_dir: &Path, file_name: &str, target: &Path) -> Result<String> {
        let shim_path = shim_dir.join(file_name);
        let temp_path = shim_dir.join(format!(".{file_name}.rtvm-tmp"));
        if fs::symlink_metadata(&temp_path).is_ok() {
            fs::remove_file(&temp_path)?;
        }
        symlink(target, &temp_path).map_err(|e| {
            RtvmError::IoError(format!(
                "Failed to create shim {} -> {}: {}",
                temp_path.display(),
                target.display(),
                e
            ))
        })?;
        if let Err(e) = fs::rename(&temp_path, &shim_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(RtvmError::IoError(format!(
                "Failed to move shim into place at {}: {}",
                shim_path.display(),
                e
            )));
        }
        Ok(file_name.to_string())
    }

    /// Only symlinks count as shims; anything else in the directory is left
    /// alone.
    pub fn existing_shims(shim_dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(shim_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_symlink() {
                names.push(name);
            }
        }
        Ok(names)
    }

    pub fn read_shim(shim_dir: &Path, name: &str) -> Option<PathBuf> {
        fs::read_link(shim_dir.join(name)).ok()
    }
}

#[cfg(not(unix))]
mod platform {
    use std::fs;
    use std::path::{Path, PathBuf};

    use rtvm_common::error::Result;

    use crate::fs::atomic_write_file;

    const SHIM_EXT: &str = "cmd";

    pub fn is_executable(path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
    }

    /// Writes a `<stem>.cmd` dispatch script forwarding all arguments.
    pub fn write_shim(shim_dir: &Path, file_name: &str, target: &Path) -> Result<String> {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        let shim_name = format!("{stem}.{SHIM_EXT}");
        let script = format!("@echo off\r\n\"{}\" %*\r\n", target.display());
        atomic_write_file(&shim_dir.join(&shim_name), script.as_bytes())?;
        Ok(shim_name)
    }

    pub fn existing_shims(shim_dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(shim_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(SHIM_EXT))
            {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }

    pub fn read_shim(shim_dir: &Path, name: &str) -> Option<PathBuf> {
        let script = fs::read_to_string(shim_dir.join(format!("{name}.{SHIM_EXT}"))).ok()?;
        script
            .lines()
            .find_map(|line| line.strip_prefix('"')?.split_once('"'))
            .map(|(target, _)| PathBuf::from(target))
    }
}
