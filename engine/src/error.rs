//! Error types for the mirror engine.
//!
//! `EngineError` covers both pass-level failures (bad configuration, missing
//! source root) and the per-entry failures that `run_pass` records in the
//! `PassReport` instead of propagating.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the engine.
///
/// Configuration and source-root variants stop a pass before it starts.
/// The remaining variants describe a single entry and are folded into the
/// pass report by the mirror loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No configuration file at the given path
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Configuration file was missing and a placeholder has been written
    #[error(
        "Configuration file was missing; a placeholder was written to {}. Edit it and restart",
        path.display()
    )]
    ConfigMissing { path: PathBuf },

    /// Configuration file exists but cannot be read
    #[error("Failed to read configuration file: {}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    /// Configuration file is not valid JSON for a backup configuration
    #[error("Malformed configuration file {}: {source}", path.display())]
    ConfigParse { path: PathBuf, source: serde_json::Error },

    /// Configuration file cannot be written
    #[error("Failed to write configuration file: {}", path.display())]
    ConfigWrite { path: PathBuf, source: io::Error },

    /// Source root does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source root exists but cannot be inspected
    #[error("Source directory access denied: {}", path.display())]
    SourceAccessDenied { path: PathBuf, source: io::Error },

    /// Backup path cannot be inspected
    #[error("Backup path not accessible: {}", path.display())]
    DestinationAccessDenied { path: PathBuf, source: io::Error },

    /// Failed to read from a file
    #[error("Failed to read file: {}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a file
    #[error("Failed to write file: {}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Path is unusable for mirroring
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Failed to enumerate part of the source tree
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory in the backup tree
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::ConfigRead { source, .. }
            | Self::ConfigWrite { source, .. }
            | Self::SourceAccessDenied { source, .. }
            | Self::DestinationAccessDenied { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => {
                source.raw_os_error().map(|e| e as u32)
            }
            _ => None,
        }
    }

    /// Message including the underlying I/O cause, for logs and reports.
    pub fn detailed_message(&self) -> String {
        match self {
            Self::ConfigRead { source, .. }
            | Self::ConfigWrite { source, .. }
            | Self::SourceAccessDenied { source, .. }
            | Self::DestinationAccessDenied { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => format!("{}: {}", self, source),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_os_error_from_io_source() {
        let err = EngineError::ReadError {
            path: PathBuf::from("a.txt"),
            source: io::Error::from_raw_os_error(2),
        };
        assert_eq!(err.raw_os_error(), Some(2));

        let err = EngineError::SourceNotFound { path: PathBuf::from("src") };
        assert_eq!(err.raw_os_error(), None);
    }

    #[test]
    fn test_detailed_message_includes_cause() {
        let err = EngineError::WriteError {
            path: PathBuf::from("out.bin"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        let message = err.detailed_message();
        assert!(message.contains("out.bin"));
        assert!(message.contains("disk full"));
    }
}
