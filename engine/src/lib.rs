//! # Mirror Engine - Scheduled Local Backup Library
//!
//! A headless engine that mirrors a source directory tree into a backup
//! directory, copying only what is new or whose content has changed.
//!
//! ## Overview
//!
//! - Lazy, depth-first walk of the source tree
//! - Structural mapping of every source path into the backup root
//! - Change detection by full-content checksum, never by size or mtime alone
//! - Per-entry error isolation with a report of every failed path
//! - Progress reporting via callbacks (decoupled from UI technology)
//! - A scheduler that reloads the configuration before every pass
//!
//! ## Basic Usage
//!
//! ```no_run
//! use mirror_engine::{run_pass, BackupConfig, PassOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackupConfig::load(std::path::Path::new("config.json"))?;
//!
//! let report = run_pass(&config, &PassOptions::default(), None)?;
//! println!("{} copied, {} unchanged", report.copies(), report.files_unchanged);
//!
//! for failure in &report.failures {
//!     println!("{}: {}", failure.path.display(), failure.message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **config**: JSON configuration snapshots and placeholder creation
//! - **model**: Entries, actions and the pass report
//! - **error**: Error types and handling
//! - **walker**: Lazy source tree traversal
//! - **fs_ops**: Path mapping, copying and directory creation
//! - **checksums**: Chunked content checksums and the same/different verdict
//! - **mirror**: The per-entry decision procedure and the pass loop
//! - **schedule**: Startup pass plus interval passes
//! - **progress**: Progress callback trait
//! - **notify**: Operator notification

pub mod checksums;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod mirror;
pub mod model;
pub mod notify;
pub mod progress;
pub mod schedule;
pub mod walker;

// Re-export main types and functions
pub use checksums::{
    compare_files, compute_file_checksum, ChecksumAlgorithm, ChecksumValue, Verdict, CHUNK_SIZE,
};
pub use config::{load_or_create_config, BackupConfig};
pub use error::EngineError;
pub use mirror::{mirror_entry, run_pass, PassOptions};
pub use model::{
    EntryFailure, EntryKind, EntryRecord, EntryState, MirrorAction, PassReport, SourceEntry,
};
pub use notify::{ConsoleNotifier, NoopNotifier, Notifier};
pub use progress::ProgressCallback;
pub use schedule::Scheduler;
pub use walker::{walk_source_tree, TreeWalker};
