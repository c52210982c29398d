// Path: rtvm-core/src/extract.rs
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use rtvm_common::error::{Result, RtvmError};
use rtvm_common::model::ArchiveFormat;
use tar::{Archive, EntryType};
use tracing::{debug, error};
use zip::read::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Unpacks one archive format into a directory, dropping `strip_prefix` from
/// the front of every entry path.
pub trait Extractor {
    fn extract(&self, archive_path: &Path, dest_dir: &Path, strip_prefix: &str) -> Result<()>;
}

pub struct TarGzExtractor;
pub struct ZipExtractor;

pub fn extractor_for(format: ArchiveFormat) -> &'static dyn Extractor {
    match format {
        ArchiveFormat::TarGz => &TarGzExtractor,
        ArchiveFormat::Zip => &ZipExtractor,
    }
}

pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    format: ArchiveFormat,
    strip_prefix: &str,
) -> Result<()> {
    debug!(
        "Extracting {} archive '{}' to '{}' (strip prefix '{}')",
        format,
        archive_path.display(),
        dest_dir.display(),
        strip_prefix
    );
    fs::create_dir_all(dest_dir).map_err(|e| {
        RtvmError::IoError(format!(
            "Failed to create target directory {}: {}",
            dest_dir.display(),
            e
        ))
    })?;
    extractor_for(format).extract(archive_path, dest_dir, strip_prefix)
}

fn open_archive(archive_path: &Path) -> Result<File> {
    File::open(archive_path).map_err(|e| {
        RtvmError::IoError(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })
}

/// Maps an entry path to its location under `dest_dir`. Returns `None` for
/// the stripped root itself. Rejects anything that could escape `dest_dir`.
pub(crate) fn target_path(
    dest_dir: &Path,
    entry_path: &Path,
    strip_prefix: &str,
) -> Result<Option<PathBuf>> {
    let mut components = entry_path.components().peekable();
    if let Some(Component::Normal(first)) = components.peek() {
        if !strip_prefix.is_empty() && *first == strip_prefix {
            components.next();
        }
    }

    let mut target = dest_dir.to_path_buf();
    let mut pushed = false;
    for comp in components {
        match comp {
            Component::Normal(part) => {
                target.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                error!(
                    "Disallowed component {:?} in archive path {}",
                    comp,
                    entry_path.display()
                );
                return Err(RtvmError::Format(format!(
                    "Unsafe path '{}' in archive",
                    entry_path.display()
                )));
            }
        }
    }
    Ok(pushed.then_some(target))
}

/// Resolved form of `dest_dir`; every write is checked against it.
fn canonical_root(dest_dir: &Path) -> Result<PathBuf> {
    fs::canonicalize(dest_dir).map_err(|e| {
        RtvmError::IoError(format!(
            "Failed to resolve target directory {}: {}",
            dest_dir.display(),
            e
        ))
    })
}

/// Fails when the nearest existing ancestor of `path` (itself included)
/// resolves outside `root`, e.g. through a symlink an earlier entry created.
fn ensure_within(root: &Path, path: &Path, entry_path: &Path) -> Result<()> {
    let mut existing = path;
    loop {
        match fs::symlink_metadata(existing) {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::NotFound => match existing.parent() {
                Some(parent) => existing = parent,
                None => return Ok(()),
            },
            Err(e) => return Err(e.into()),
        }
    }
    let escapes = match fs::canonicalize(existing) {
        Ok(resolved) => !resolved.starts_with(root),
        Err(_) => true,
    };
    if escapes {
        error!(
            "Archive entry {} would be written through {} outside {}",
            entry_path.display(),
            existing.display(),
            root.display()
        );
        return Err(RtvmError::Format(format!(
            "Archive entry '{}' escapes the target directory",
            entry_path.display()
        )));
    }
    Ok(())
}

/// Symlink targets must be relative and stay inside `dest_dir` when resolved
/// from the link's own directory.
fn check_link_target(
    dest_dir: &Path,
    link_at: &Path,
    link_target: &Path,
    entry_path: &Path,
) -> Result<()> {
    let mut depth = link_at
        .parent()
        .and_then(|parent| parent.strip_prefix(dest_dir).ok())
        .map_or(0, |rel| rel.components().count());
    let unsafe_link = || {
        error!(
            "Symlink {} -> {} points outside the archive root",
            entry_path.display(),
            link_target.display()
        );
        RtvmError::Format(format!(
            "Unsafe symlink '{}' -> '{}' in archive",
            entry_path.display(),
            link_target.display()
        ))
    };
    for comp in link_target.components() {
        match comp {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => depth = depth.checked_sub(1).ok_or_else(unsafe_link)?,
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_link()),
        }
    }
    Ok(())
}

/// Directory modes are applied once everything is written, deepest first, so
/// a read-only directory does not block its own contents.
#[cfg(unix)]
fn apply_dir_modes(dir_modes: &[(PathBuf, u32)]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    for (dir, mode) in dir_modes.iter().rev() {
        fs::set_permissions(dir, fs::Permissions::from_mode(*mode)).map_err(|e| {
            RtvmError::IoError(format!(
                "Failed to set mode {:o} on {}: {}",
                mode,
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_dir_modes(_dir_modes: &[(PathBuf, u32)]) -> Result<()> {
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                RtvmError::IoError(format!("Failed create dir {}: {}", parent.display(), e))
            })?;
        }
    }
    Ok(())
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => fs::remove_file(path).map_err(|e| {
            RtvmError::IoError(format!("Failed to replace {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn create_symlink(link_target: &Path, at: &Path) -> Result<()> {
    remove_existing(at)?;
    std::os::unix::fs::symlink(link_target, at).map_err(|e| {
        RtvmError::IoError(format!(
            "Failed to create symlink {} -> {}: {}",
            at.display(),
            link_target.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn create_symlink(link_target: &Path, at: &Path) -> Result<()> {
    tracing::warn!(
        "Cannot create symlink on this platform: {} -> {}",
        at.display(),
        link_target.display()
    );
    Ok(())
}

impl Extractor for TarGzExtractor {
    fn extract(&self, archive_path: &Path, dest_dir: &Path, strip_prefix: &str) -> Result<()> {
        let file = open_archive(archive_path)?;
        unpack_tar(GzDecoder::new(file), dest_dir, strip_prefix, archive_path)
    }
}

fn unpack_tar<R: Read>(
    reader: R,
    dest_dir: &Path,
    strip_prefix: &str,
    archive_path_for_log: &Path,
) -> Result<()> {
    let root = canonical_root(dest_dir)?;
    let mut dir_modes = Vec::new();
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let entries = archive.entries().map_err(|e| {
        RtvmError::Format(format!(
            "Failed to read TAR {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| {
            RtvmError::Format(format!(
                "Error reading TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        let entry_path = entry
            .path()
            .map_err(|e| {
                RtvmError::Format(format!(
                    "Invalid path in TAR entry from {}: {}",
                    archive_path_for_log.display(),
                    e
                ))
            })?
            .into_owned();

        let Some(target) = target_path(dest_dir, &entry_path, strip_prefix)? else {
            continue;
        };
        let entry_type = entry.header().entry_type();
        if entry_type == EntryType::Directory {
            ensure_within(&root, &target, &entry_path)?;
        } else if let Some(parent) = target.parent() {
            ensure_within(&root, parent, &entry_path)?;
        }
        ensure_parent(&target)?;

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                let bits = entry.header().mode().map_or(0, |m| m & 0o7777);
                if bits != 0 {
                    dir_modes.push((target, bits));
                }
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                remove_existing(&target)?;
                entry.unpack(&target).map_err(|e| {
                    RtvmError::IoError(format!(
                        "Failed to unpack {} to {}: {}",
                        entry_path.display(),
                        target.display(),
                        e
                    ))
                })?;
            }
            EntryType::Symlink => {
                let link_target = entry
                    .link_name()?
                    .ok_or_else(|| {
                        RtvmError::Format(format!(
                            "Symlink entry '{}' has no target",
                            entry_path.display()
                        ))
                    })?
                    .into_owned();
                check_link_target(dest_dir, &target, &link_target, &entry_path)?;
                create_symlink(&link_target, &target)?;
            }
            EntryType::Link => {
                let link_name = entry.link_name()?.ok_or_else(|| {
                    RtvmError::Format(format!(
                        "Hardlink entry '{}' has no target",
                        entry_path.display()
                    ))
                })?;
                let Some(original) = target_path(dest_dir, &link_name, strip_prefix)? else {
                    continue;
                };
                if let Some(parent) = original.parent() {
                    ensure_within(&root, parent, &entry_path)?;
                }
                remove_existing(&target)?;
                fs::hard_link(&original, &target).map_err(|e| {
                    RtvmError::IoError(format!(
                        "Failed to create hardlink {} -> {}: {}",
                        target.display(),
                        original.display(),
                        e
                    ))
                })?;
            }
            other => {
                debug!(
                    "Skipping TAR entry {} of type {:?}",
                    entry_path.display(),
                    other
                );
            }
        }
    }

    apply_dir_modes(&dir_modes)?;
    debug!(
        "Finished TAR extraction for {}",
        archive_path_for_log.display()
    );
    Ok(())
}

impl Extractor for ZipExtractor {
    fn extract(&self, archive_path: &Path, dest_dir: &Path, strip_prefix: &str) -> Result<()> {
        let file = open_archive(archive_path)?;
        unpack_zip(file, dest_dir, strip_prefix, archive_path)
    }
}

fn unpack_zip<R: Read + Seek>(
    reader: R,
    dest_dir: &Path,
    strip_prefix: &str,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = ZipArchive::new(reader).map_err(|e| {
        RtvmError::Format(format!(
            "Failed to open ZIP {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })?;

    let root = canonical_root(dest_dir)?;
    let mut dir_modes = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            RtvmError::Format(format!(
                "Error reading ZIP index {} in {}: {}",
                i,
                archive_path_for_log.display(),
                e
            ))
        })?;
        let entry_path = PathBuf::from(file.name());
        let Some(target) = target_path(dest_dir, &entry_path, strip_prefix)? else {
            continue;
        };
        if file.is_dir() {
            ensure_within(&root, &target, &entry_path)?;
        } else if let Some(parent) = target.parent() {
            ensure_within(&root, parent, &entry_path)?;
        }
        ensure_parent(&target)?;

        let mode = file.unix_mode();
        if file.is_dir() {
            fs::create_dir_all(&target)?;
            if let Some(bits) = mode.map(|m| m & 0o7777).filter(|bits| *bits != 0) {
                dir_modes.push((target, bits));
            }
            continue;
        } else if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut link_target = String::new();
            file.read_to_string(&mut link_target)?;
            let link_target = PathBuf::from(link_target);
            check_link_target(dest_dir, &target, &link_target, &entry_path)?;
            create_symlink(&link_target, &target)?;
            continue;
        } else {
            remove_existing(&target)?;
            let mut out_file = File::create(&target).map_err(|e| {
                RtvmError::IoError(format!("Failed create file {}: {}", target.display(), e))
            })?;
            io::copy(&mut file, &mut out_file)?;
        }

        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            let bits = mode & 0o7777;
            if bits != 0 {
                fs::set_permissions(&target, fs::Permissions::from_mode(bits))?;
            }
        }
    }

    apply_dir_modes(&dir_modes)?;
    debug!(
        "Finished ZIP extraction for {}",
        archive_path_for_log.display()
    );
    Ok(())
}
