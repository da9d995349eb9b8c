//! Source tree traversal.
//!
//! `walk_source_tree` returns a lazy, depth-first iterator over every path
//! under the source root, the root included. Directories are always yielded
//! before their contents, and siblings are sorted by file name.

use crate::error::EngineError;
use crate::model::{EntryKind, SourceEntry};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Lazy iterator over a source tree.
///
/// Each item is either a `SourceEntry` or the traversal error for a path that
/// could not be read. The walk carries on past errors; the caller decides
/// what to do with them.
pub struct TreeWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
}

/// Start a fresh walk of `root`.
pub fn walk_source_tree(root: &Path) -> TreeWalker {
    TreeWalker {
        root: root.to_path_buf(),
        inner: WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter(),
    }
}

impl TreeWalker {
    fn convert_error(&self, err: walkdir::Error) -> EngineError {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        EngineError::EnumerationFailed {
            path,
            source: io::Error::from(err),
        }
    }
}

/// Classify a walked entry.
///
/// Symlinks to regular files are reported as files (their target content is
/// copied). Symlinks to directories, dangling symlinks and special files
/// (FIFOs, sockets, device nodes) yield `None`.
fn classify(entry: &DirEntry) -> io::Result<Option<SourceEntry>> {
    let path = entry.path().to_path_buf();
    let file_type = entry.file_type();

    if file_type.is_symlink() {
        return match fs::metadata(&path) {
            Ok(resolved) if resolved.is_file() => Ok(Some(SourceEntry {
                path,
                kind: EntryKind::File,
                size: resolved.len(),
            })),
            Ok(_) => {
                debug!(path = %path.display(), "skipping symlink to non-file");
                Ok(None)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping dangling symlink");
                Ok(None)
            }
        };
    }

    if file_type.is_dir() {
        return Ok(Some(SourceEntry {
            path,
            kind: EntryKind::Directory,
            size: 0,
        }));
    }

    if !file_type.is_file() {
        debug!(path = %path.display(), "skipping special file");
        return Ok(None);
    }

    let metadata = entry.metadata().map_err(io::Error::from)?;
    Ok(Some(SourceEntry {
        path,
        kind: EntryKind::File,
        size: metadata.len(),
    }))
}

impl Iterator for TreeWalker {
    type Item = Result<SourceEntry, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(self.convert_error(err))),
            };

            match classify(&entry) {
                Ok(Some(source_entry)) => return Some(Ok(source_entry)),
                Ok(None) => continue,
                Err(e) => {
                    return Some(Err(EngineError::EnumerationFailed {
                        path: entry.path().to_path_buf(),
                        source: e,
                    }))
                }
            }
        }
    }
}
