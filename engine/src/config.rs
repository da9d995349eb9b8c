//! Backup configuration.
//!
//! The configuration is a JSON file holding the source root, the backup root
//! and the number of hours between passes:
//!
//! ```json
//! { "sourcePath": "/data", "backupPath": "/mnt/backup", "timeBetweenBackups": 24 }
//! ```
//!
//! Every load returns a new immutable snapshot; nothing is shared between
//! passes.

use crate::error::EngineError;
use crate::notify::Notifier;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PLACEHOLDER_SOURCE: &str = "Source Root Directory Path";
const PLACEHOLDER_BACKUP: &str = "Backup Root Directory Path";
const PLACEHOLDER_HOURS: u64 = 24;

/// One snapshot of the backup configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackupConfig {
    /// Root of the tree to back up
    pub source_path: PathBuf,

    /// Root of the mirror
    pub backup_path: PathBuf,

    /// Hours between passes; 0 runs a single pass
    pub time_between_backups: u64,
}

impl BackupConfig {
    pub fn new<P: Into<PathBuf>>(
        source_path: P,
        backup_path: P,
        time_between_backups: u64,
    ) -> Self {
        BackupConfig {
            source_path: source_path.into(),
            backup_path: backup_path.into(),
            time_between_backups,
        }
    }

    /// Configuration written when none exists, for the operator to edit.
    pub fn placeholder() -> Self {
        BackupConfig::new(PLACEHOLDER_SOURCE, PLACEHOLDER_BACKUP, PLACEHOLDER_HOURS)
    }

    /// Load a configuration snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                EngineError::ConfigNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                EngineError::ConfigRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        serde_json::from_str(&raw).map_err(|e| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write this configuration as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| EngineError::ConfigWrite {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        fs::write(path, json + "\n").map_err(|e| EngineError::ConfigWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check that the roots can be used for a pass.
    ///
    /// The source root must be an existing directory. The backup root may be
    /// missing (the pass creates it) but must not be something else, and it
    /// must not lie inside the source root.
    pub fn validate(&self) -> Result<(), EngineError> {
        match fs::metadata(&self.source_path) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(EngineError::InvalidPath {
                    path: self.source_path.clone(),
                    reason: "Source must be a directory".to_string(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::SourceNotFound {
                    path: self.source_path.clone(),
                })
            }
            Err(e) => {
                return Err(EngineError::SourceAccessDenied {
                    path: self.source_path.clone(),
                    source: e,
                })
            }
        }

        if self.backup_path.as_os_str().is_empty() {
            return Err(EngineError::InvalidPath {
                path: self.backup_path.clone(),
                reason: "Backup path is empty".to_string(),
            });
        }

        match fs::metadata(&self.backup_path) {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(EngineError::InvalidPath {
                    path: self.backup_path.clone(),
                    reason: "Backup root exists but is not a directory".to_string(),
                })
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(EngineError::DestinationAccessDenied {
                    path: self.backup_path.clone(),
                    source: e,
                })
            }
        }

        let source = fs::canonicalize(&self.source_path).map_err(|e| {
            EngineError::SourceAccessDenied {
                path: self.source_path.clone(),
                source: e,
            }
        })?;
        let backup = resolve_path(&self.backup_path).map_err(|e| {
            EngineError::DestinationAccessDenied {
                path: self.backup_path.clone(),
                source: e,
            }
        })?;

        if backup.starts_with(&source) {
            return Err(EngineError::InvalidPath {
                path: self.backup_path.clone(),
                reason: "Backup root must not be inside the source root".to_string(),
            });
        }

        Ok(())
    }

    /// Time to wait between the end of one pass and the start of the next.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.time_between_backups.saturating_mul(3600))
    }
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
///
/// The deepest existing ancestor is canonicalized and the missing trailing
/// components are appended to it.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;

    loop {
        let candidate = if current.as_os_str().is_empty() {
            Path::new(".")
        } else {
            current
        };
        match fs::canonicalize(candidate) {
            Ok(base) => {
                return Ok(missing.iter().rev().fold(base, |acc, name| acc.join(name)));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (current.parent(), current.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        current = parent;
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Load the configuration, creating a placeholder file if there is none.
///
/// When the file is missing, a placeholder is written, the operator is told
/// to edit it, and `ConfigMissing` is returned so the caller can stop.
pub fn load_or_create_config(
    path: &Path,
    notifier: &dyn Notifier,
) -> Result<BackupConfig, EngineError> {
    match BackupConfig::load(path) {
        Err(EngineError::ConfigNotFound { .. }) => {
            BackupConfig::placeholder().write(path)?;
            notifier.notify_operator(&format!(
                "Please update {} and re-run the program!",
                path.display()
            ));
            Err(EngineError::ConfigMissing {
                path: path.to_path_buf(),
            })
        }
        other => other,
    }
}
