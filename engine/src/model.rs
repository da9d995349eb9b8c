//! Core data model for backup passes.
//!
//! This module defines the values that flow through a pass:
//! - SourceEntry: one path discovered by the tree walker
//! - MirrorAction / EntryState: what the engine decided and how it ended
//! - EntryRecord: the outcome for one entry
//! - PassReport: the aggregated result of a whole pass

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// Whether a walked path is a directory or a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// A single path discovered under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Full source path
    pub path: PathBuf,

    /// File or directory
    pub kind: EntryKind,

    /// File size in bytes (0 for directories)
    pub size: u64,
}

impl SourceEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// The decision taken by the mirror engine for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    /// Backup directory was missing and has been created
    CreateDirectory,
    /// Backup file was missing and has been copied
    CopyNew,
    /// Backup file content differed and has been overwritten
    CopyChanged,
    /// Backup file content matches; nothing written
    Unchanged,
    /// Backup directory already exists; nothing done
    DirectoryPresent,
}

impl MirrorAction {
    /// Returns true if this action writes to the backup tree.
    pub fn writes(&self) -> bool {
        matches!(
            self,
            MirrorAction::CreateDirectory | MirrorAction::CopyNew | MirrorAction::CopyChanged
        )
    }
}

impl std::fmt::Display for MirrorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorAction::CreateDirectory => write!(f, "CreateDirectory"),
            MirrorAction::CopyNew => write!(f, "CopyNew"),
            MirrorAction::CopyChanged => write!(f, "CopyChanged"),
            MirrorAction::Unchanged => write!(f, "Unchanged"),
            MirrorAction::DirectoryPresent => write!(f, "DirectoryPresent"),
        }
    }
}

/// Final state of an entry within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Backup written (directory created or file copied)
    Done,
    /// Nothing to do
    Skipped,
    /// Error occurred; backup for this entry not updated
    Failed,
}

/// Outcome of mirroring one source entry.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    /// Full source path
    pub source_path: PathBuf,

    /// Mapped backup path (equal to the source path if mapping failed)
    pub backup_path: PathBuf,

    pub kind: EntryKind,

    /// Decision taken, if the engine got far enough to make one
    pub action: Option<MirrorAction>,

    pub state: EntryState,

    /// Bytes written for this entry
    pub bytes_copied: u64,

    /// OS error code if state is Failed
    pub error_code: Option<u32>,

    /// Human-readable error message
    pub error_message: Option<String>,

    /// Set when the content comparison failed and the file was recopied
    pub comparison_error: Option<String>,
}

impl EntryRecord {
    pub(crate) fn new(entry: &SourceEntry, backup_path: PathBuf) -> Self {
        EntryRecord {
            source_path: entry.path.clone(),
            backup_path,
            kind: entry.kind,
            action: None,
            state: EntryState::Skipped,
            bytes_copied: 0,
            error_code: None,
            error_message: None,
            comparison_error: None,
        }
    }

    pub(crate) fn fail(mut self, error: &crate::error::EngineError) -> Self {
        self.state = EntryState::Failed;
        self.error_code = error.raw_os_error();
        self.error_message = Some(error.detailed_message());
        self
    }
}

/// A failed path recorded in the pass report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub error_code: Option<u32>,
    pub message: String,
}

/// Aggregated result of one backup pass.
///
/// A pass with failures still covers every other entry; the failures are
/// listed here rather than turned into a pass-level error.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Unique identifier for this pass
    pub id: Uuid,

    pub source_root: PathBuf,
    pub backup_root: PathBuf,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub directories_created: usize,
    pub directories_present: usize,
    pub files_copied_new: usize,
    pub files_copied_changed: usize,
    pub files_unchanged: usize,

    /// Total bytes written into the backup tree
    pub bytes_copied: u64,

    /// Comparisons that errored and fell back to recopying
    pub comparison_errors: usize,

    pub failures: Vec<EntryFailure>,
}

impl PassReport {
    pub fn new(source_root: PathBuf, backup_root: PathBuf) -> Self {
        PassReport {
            id: Uuid::new_v4(),
            source_root,
            backup_root,
            started_at: Utc::now(),
            finished_at: None,
            directories_created: 0,
            directories_present: 0,
            files_copied_new: 0,
            files_copied_changed: 0,
            files_unchanged: 0,
            bytes_copied: 0,
            comparison_errors: 0,
            failures: Vec::new(),
        }
    }

    /// Fold one entry outcome into the totals.
    pub fn record(&mut self, record: &EntryRecord) {
        if record.comparison_error.is_some() {
            self.comparison_errors += 1;
        }

        if record.state == EntryState::Failed {
            self.failures.push(EntryFailure {
                path: record.source_path.clone(),
                error_code: record.error_code,
                message: record
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
            return;
        }

        self.bytes_copied += record.bytes_copied;
        match record.action {
            Some(MirrorAction::CreateDirectory) => self.directories_created += 1,
            Some(MirrorAction::DirectoryPresent) => self.directories_present += 1,
            Some(MirrorAction::CopyNew) => self.files_copied_new += 1,
            Some(MirrorAction::CopyChanged) => self.files_copied_changed += 1,
            Some(MirrorAction::Unchanged) => self.files_unchanged += 1,
            None => {}
        }
    }

    /// Record a failure that has no entry behind it (walk errors).
    pub fn record_failure(&mut self, error: &crate::error::EngineError, path: PathBuf) {
        self.failures.push(EntryFailure {
            path,
            error_code: error.raw_os_error(),
            message: error.detailed_message(),
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Number of files written (new or changed).
    pub fn copies(&self) -> usize {
        self.files_copied_new + self.files_copied_changed
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of entries the pass looked at, including failed ones.
    pub fn entries_seen(&self) -> usize {
        self.directories_created
            + self.directories_present
            + self.files_copied_new
            + self.files_copied_changed
            + self.files_unchanged
            + self.failures.len()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}
