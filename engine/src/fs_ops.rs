//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Mapping source paths into the backup tree
//! - Inspecting what already exists at a backup path
//! - Copying files with modification time preservation
//! - Creating backup directories

use crate::error::EngineError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What currently occupies a backup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupSlot {
    Missing,
    Directory,
    /// A regular file, symlink or anything else that is not a directory
    File,
}

/// Map a source path into backup space.
///
/// The result is the backup root followed by the source path with the source
/// root prefix stripped. The source root itself maps to the backup root.
///
/// # Errors
/// Returns `InvalidPath` if `source_path` does not lie under `source_root`.
pub fn backup_path_for(
    source_root: &Path,
    backup_root: &Path,
    source_path: &Path,
) -> Result<PathBuf, EngineError> {
    let relative = source_path
        .strip_prefix(source_root)
        .map_err(|_| EngineError::InvalidPath {
            path: source_path.to_path_buf(),
            reason: format!("not under source root {}", source_root.display()),
        })?;

    if relative.as_os_str().is_empty() {
        Ok(backup_root.to_path_buf())
    } else {
        Ok(backup_root.join(relative))
    }
}

/// Inspect a backup path without following symlinks.
///
/// # Errors
/// Any stat failure other than "not found" is returned as
/// `DestinationAccessDenied`.
pub fn inspect_backup_path(path: &Path) -> Result<BackupSlot, EngineError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(BackupSlot::Directory),
        Ok(_) => Ok(BackupSlot::File),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BackupSlot::Missing),
        Err(e) => Err(EngineError::DestinationAccessDenied {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Copy a file's full content, creating or truncating the destination.
///
/// When `preserve_mtime` is set, the source modification time is applied to
/// the copy; failing to do so does not fail the copy.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// `ReadError` if the source cannot be opened or read, `WriteError` if the
/// destination cannot be created or written.
pub fn copy_file(src: &Path, dst: &Path, preserve_mtime: bool) -> Result<u64, EngineError> {
    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_mtime = src_file
        .metadata()
        .ok()
        .and_then(|metadata| metadata.modified().ok());

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;

    dst_file.sync_all().map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;
    drop(dst_file);

    if preserve_mtime {
        if let Some(mtime) = src_mtime {
            let _ = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime));
        }
    }

    Ok(bytes_copied)
}

/// Create a single backup directory.
///
/// The parent is expected to exist already; the walk visits every directory
/// before its contents.
pub fn create_backup_dir(path: &Path) -> Result<(), EngineError> {
    fs::create_dir(path).map_err(|e| EngineError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
