//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which keeps the mirror
//! engine independent of how progress is shown (log lines, console summary,
//! or nothing at all).

use crate::model::{EntryRecord, PassReport};

/// Trait for receiving progress updates from a backup pass.
///
/// All methods are called synchronously from the thread running the pass.
pub trait ProgressCallback: Send {
    /// Called once the source root has been validated and walking starts.
    fn on_pass_started(&self, report: &PassReport);

    /// Called after each walked entry has been mirrored, skipped or failed.
    ///
    /// `entry_index` counts entries in walk order, starting at 0. Paths the
    /// walk could not read are recorded as failures in the report and do not
    /// take an index.
    fn on_entry_completed(&self, report: &PassReport, entry_index: usize, record: &EntryRecord);

    /// Called when every entry has been processed.
    fn on_pass_completed(&self, report: &PassReport);
}
