//! Mirror engine.
//!
//! This module runs one backup pass:
//! - Validating the configured roots
//! - Pulling entries from the tree walker one at a time
//! - Deciding per entry between create, copy, recopy and skip
//! - Folding every outcome into a `PassReport`
//!
//! Per-entry failures are logged and recorded; they never stop the pass.

use crate::checksums::{compare_files, ChecksumAlgorithm, Verdict};
use crate::config::BackupConfig;
use crate::error::EngineError;
use crate::fs_ops::{self, BackupSlot};
use crate::model::{EntryKind, EntryRecord, EntryState, MirrorAction, PassReport, SourceEntry};
use crate::progress::ProgressCallback;
use crate::walker::walk_source_tree;
use std::path::Path;
use tracing::{debug, info, warn};

/// Knobs for a pass that are not part of the persisted configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    /// Digest used by the content comparator
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Apply the source modification time to copied files
    pub preserve_mtime: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        PassOptions {
            checksum_algorithm: ChecksumAlgorithm::Md5,
            preserve_mtime: true,
        }
    }
}

/// Turn a comparison result into a verdict, assuming "different" on error.
///
/// The error message is returned alongside for the entry record.
fn verdict_or_recopy(
    result: Result<Verdict, EngineError>,
    source_path: &Path,
) -> (Verdict, Option<String>) {
    match result {
        Ok(verdict) => (verdict, None),
        Err(e) => {
            let message = e.detailed_message();
            warn!(
                path = %source_path.display(),
                error = %message,
                "content comparison failed, recopying"
            );
            (Verdict::Different, Some(message))
        }
    }
}

/// Mirror a single source entry into the backup tree.
///
/// Never returns an error: failures end up in the returned record.
pub fn mirror_entry(
    entry: &SourceEntry,
    source_root: &Path,
    backup_root: &Path,
    options: &PassOptions,
) -> EntryRecord {
    let backup_path = match fs_ops::backup_path_for(source_root, backup_root, &entry.path) {
        Ok(path) => path,
        Err(e) => return EntryRecord::new(entry, entry.path.clone()).fail(&e),
    };
    let mut record = EntryRecord::new(entry, backup_path);

    let slot = match fs_ops::inspect_backup_path(&record.backup_path) {
        Ok(slot) => slot,
        Err(e) => return record.fail(&e),
    };

    match (entry.kind, slot) {
        (EntryKind::Directory, BackupSlot::Missing) => {
            record.action = Some(MirrorAction::CreateDirectory);
            if let Err(e) = fs_ops::create_backup_dir(&record.backup_path) {
                return record.fail(&e);
            }
            record.state = EntryState::Done;
        }
        (EntryKind::Directory, BackupSlot::Directory) => {
            record.action = Some(MirrorAction::DirectoryPresent);
        }
        (EntryKind::Directory, BackupSlot::File) => {
            let e = EngineError::InvalidPath {
                path: record.backup_path.clone(),
                reason: "backup path exists but is not a directory".to_string(),
            };
            return record.fail(&e);
        }
        (EntryKind::File, BackupSlot::Missing) => {
            record.action = Some(MirrorAction::CopyNew);
            return copy_into(record, options);
        }
        (EntryKind::File, _) => {
            let (verdict, comparison_error) = verdict_or_recopy(
                compare_files(&entry.path, &record.backup_path, options.checksum_algorithm),
                &entry.path,
            );
            record.comparison_error = comparison_error;

            match verdict {
                Verdict::Same => record.action = Some(MirrorAction::Unchanged),
                Verdict::Different => {
                    record.action = Some(MirrorAction::CopyChanged);
                    return copy_into(record, options);
                }
            }
        }
    }

    record
}

fn copy_into(mut record: EntryRecord, options: &PassOptions) -> EntryRecord {
    match fs_ops::copy_file(&record.source_path, &record.backup_path, options.preserve_mtime) {
        Ok(bytes) => {
            record.bytes_copied = bytes;
            record.state = EntryState::Done;
            record
        }
        Err(e) => record.fail(&e),
    }
}

fn log_record(record: &EntryRecord) {
    match (record.state, record.action) {
        (EntryState::Failed, _) => warn!(
            path = %record.source_path.display(),
            error = record.error_message.as_deref().unwrap_or("unknown error"),
            "entry failed"
        ),
        (_, Some(action)) if action.writes() => debug!(
            path = %record.source_path.display(),
            backup = %record.backup_path.display(),
            %action,
            bytes = record.bytes_copied,
            "mirrored"
        ),
        (_, action) => debug!(
            path = %record.source_path.display(),
            action = ?action,
            "skipped"
        ),
    }
}

/// Run one full backup pass.
///
/// Walks the source root and mirrors every entry in walk order, so each
/// directory is created before anything is placed inside it.
///
/// # Errors
/// Returns `EngineError` only when the pass cannot start (source root
/// missing or unusable). Entry-level failures are listed in the report.
pub fn run_pass(
    config: &BackupConfig,
    options: &PassOptions,
    progress: Option<&dyn ProgressCallback>,
) -> Result<PassReport, EngineError> {
    config.validate()?;

    let source_root = config.source_path.as_path();
    let backup_root = config.backup_path.as_path();
    let mut report = PassReport::new(source_root.to_path_buf(), backup_root.to_path_buf());

    info!(
        pass = %report.id,
        source = %source_root.display(),
        backup = %backup_root.display(),
        algorithm = %options.checksum_algorithm,
        "backup pass started"
    );
    if let Some(callback) = progress {
        callback.on_pass_started(&report);
    }

    let mut entry_index = 0;
    for item in walk_source_tree(source_root) {
        let record = match item {
            Ok(entry) => mirror_entry(&entry, source_root, backup_root, options),
            Err(e) => {
                let path = match &e {
                    EngineError::EnumerationFailed { path, .. } => path.clone(),
                    _ => source_root.to_path_buf(),
                };
                warn!(
                    path = %path.display(),
                    error = %e.detailed_message(),
                    "walk error, skipping"
                );
                report.record_failure(&e, path);
                continue;
            }
        };

        log_record(&record);
        report.record(&record);

        if let Some(callback) = progress {
            callback.on_entry_completed(&report, entry_index, &record);
        }
        entry_index += 1;
    }

    report.finish();
    info!(
        pass = %report.id,
        created = report.directories_created,
        copied_new = report.files_copied_new,
        copied_changed = report.files_copied_changed,
        unchanged = report.files_unchanged,
        failed = report.failed_count(),
        bytes = report.bytes_copied,
        "backup pass finished"
    );
    if let Some(callback) = progress {
        callback.on_pass_completed(&report);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct Roots {
        _temp_dir: tempfile::TempDir,
        src: PathBuf,
        dst: PathBuf,
    }

    fn roots() -> Roots {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::create_dir(&dst).expect("Failed to create dst dir");
        Roots {
            _temp_dir: temp_dir,
            src,
            dst,
        }
    }

    fn pass(roots: &Roots) -> PassReport {
        let config = BackupConfig::new(roots.src.clone(), roots.dst.clone(), 1);
        run_pass(&config, &PassOptions::default(), None).expect("Pass should run")
    }

    fn read_backup(roots: &Roots, rel: &str) -> Vec<u8> {
        fs::read(roots.dst.join(rel)).expect("Failed to read backup")
    }

    fn file_entry(path: PathBuf) -> SourceEntry {
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        SourceEntry {
            path,
            kind: EntryKind::File,
            size,
        }
    }

    #[test]
    fn test_new_file_is_copied() {
        let roots = roots();
        fs::write(roots.src.join("f1.txt"), b"A").expect("Failed to write f1");

        let report = pass(&roots);

        assert_eq!(read_backup(&roots, "f1.txt"), b"A");
        assert_eq!(report.files_copied_new, 1);
        assert_eq!(report.bytes_copied, 1);
        assert!(report.is_clean());
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_changed_file_is_recopied() {
        let roots = roots();
        fs::write(roots.src.join("f1.txt"), b"B").expect("Failed to write source");
        fs::write(roots.dst.join("f1.txt"), b"A").expect("Failed to write backup");

        let report = pass(&roots);

        assert_eq!(read_backup(&roots, "f1.txt"), b"B");
        assert_eq!(report.files_copied_changed, 1);
        assert_eq!(report.files_copied_new, 0);
    }

    #[test]
    fn test_unchanged_file_is_untouched() {
        let roots = roots();
        fs::write(roots.src.join("f1.txt"), b"A").expect("Failed to write source");
        fs::write(roots.dst.join("f1.txt"), b"A").expect("Failed to write backup");

        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(roots.dst.join("f1.txt"), old).expect("Failed to set mtime");

        let report = pass(&roots);

        let metadata = fs::metadata(roots.dst.join("f1.txt")).expect("Failed to stat backup");
        assert_eq!(filetime::FileTime::from_last_modification_time(&metadata), old);
        assert_eq!(report.files_unchanged, 1);
        assert_eq!(report.copies(), 0);
        assert_eq!(report.bytes_copied, 0);
    }

    #[test]
    fn test_same_content_different_mtime_is_unchanged() {
        let roots = roots();
        fs::write(roots.src.join("f1.txt"), b"same bytes").expect("Failed to write source");
        fs::write(roots.dst.join("f1.txt"), b"same bytes").expect("Failed to write backup");
        let newer = filetime::FileTime::from_unix_time(2_000_000_000, 0);
        filetime::set_file_mtime(roots.src.join("f1.txt"), newer).expect("Failed to set mtime");

        let report = pass(&roots);
        assert_eq!(report.files_unchanged, 1);
        assert_eq!(report.copies(), 0);
    }

    #[test]
    fn test_empty_subdirectory_is_mirrored() {
        let roots = roots();
        fs::create_dir(roots.src.join("sub")).expect("Failed to create sub");

        let report = pass(&roots);

        let backup_sub = roots.dst.join("sub");
        assert!(backup_sub.is_dir());
        assert_eq!(fs::read_dir(&backup_sub).expect("Failed to read sub").count(), 0);
        assert_eq!(report.directories_created, 1);
        // The backup root itself already existed
        assert_eq!(report.directories_present, 1);
    }

    #[test]
    fn test_missing_backup_root_is_created() {
        let roots = roots();
        fs::remove_dir(&roots.dst).expect("Failed to remove dst");
        fs::write(roots.src.join("f1.txt"), b"A").expect("Failed to write f1");

        let report = pass(&roots);

        assert!(roots.dst.is_dir());
        assert_eq!(fs::read(roots.dst.join("f1.txt")).expect("Failed to read backup"), b"A");
        assert_eq!(report.directories_created, 1);
    }

    #[test]
    fn test_mirror_completeness_and_idempotence() {
        let roots = roots();
        fs::create_dir_all(roots.src.join("a/b/c")).expect("Failed to create nested dirs");
        fs::create_dir(roots.src.join("empty")).expect("Failed to create empty");
        fs::write(roots.src.join("top.txt"), b"top").expect("Failed to write top");
        fs::write(roots.src.join("a/mid.bin"), vec![7u8; 20_000]).expect("Failed to write mid");
        fs::write(roots.src.join("a/b/c/leaf name.txt"), b"leaf").expect("Failed to write leaf");

        let first = pass(&roots);
        assert!(first.is_clean());
        assert_eq!(first.copies(), 3);
        assert_eq!(first.directories_created, 4);
        assert_eq!(first.directories_present, 1);

        for rel in ["a", "a/b", "a/b/c", "empty"] {
            assert!(roots.dst.join(rel).is_dir(), "{} should be a directory", rel);
        }
        for rel in ["top.txt", "a/mid.bin", "a/b/c/leaf name.txt"] {
            assert_eq!(
                fs::read(roots.dst.join(rel)).expect("Failed to read backup"),
                fs::read(roots.src.join(rel)).expect("Failed to read source"),
                "{} should match",
                rel
            );
        }

        let second = pass(&roots);
        assert_eq!(second.copies(), 0);
        assert_eq!(second.directories_created, 0);
        assert_eq!(second.files_unchanged, 3);
        assert_eq!(second.directories_present, 5);
        assert_eq!(second.bytes_copied, 0);
    }

    #[test]
    fn test_pass_continues_after_entry_failure() {
        let roots = roots();
        fs::write(roots.src.join("blocked.txt"), b"source").expect("Failed to write blocked");
        fs::write(roots.src.join("fine.txt"), b"fine").expect("Failed to write fine");
        // A directory squatting on the backup path of a file cannot be overwritten
        fs::create_dir(roots.dst.join("blocked.txt")).expect("Failed to create squatter");

        let report = pass(&roots);

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failures[0].path, roots.src.join("blocked.txt"));
        assert_eq!(fs::read(roots.dst.join("fine.txt")).expect("Failed to read fine"), b"fine");
        assert_eq!(report.files_copied_new, 1);
    }

    #[test]
    fn test_directory_over_existing_file_fails_without_deleting() {
        let roots = roots();
        fs::create_dir(roots.src.join("sub")).expect("Failed to create sub");
        fs::write(roots.src.join("sub/inner.txt"), b"inner").expect("Failed to write inner");
        fs::write(roots.dst.join("sub"), b"not a directory").expect("Failed to write squatter");

        let report = pass(&roots);

        // The directory entry and the file below it both fail
        assert_eq!(report.failed_count(), 2);
        assert_eq!(
            fs::read(roots.dst.join("sub")).expect("Squatter should be left alone"),
            b"not a directory"
        );
    }

    #[test]
    fn test_mirror_entry_records_action() {
        let roots = roots();
        let source = roots.src.join("file.txt");
        fs::write(&source, b"hello").expect("Failed to write source");

        let options = PassOptions::default();
        let record = mirror_entry(&file_entry(source.clone()), &roots.src, &roots.dst, &options);
        assert_eq!(record.action, Some(MirrorAction::CopyNew));
        assert_eq!(record.state, EntryState::Done);
        assert_eq!(record.bytes_copied, 5);
        assert_eq!(record.backup_path, roots.dst.join("file.txt"));

        let record = mirror_entry(&file_entry(source), &roots.src, &roots.dst, &options);
        assert_eq!(record.action, Some(MirrorAction::Unchanged));
        assert_eq!(record.state, EntryState::Skipped);
    }

    #[test]
    fn test_mirror_entry_outside_root_fails() {
        let roots = roots();
        let outsider = roots._temp_dir.path().join("outsider.txt");
        fs::write(&outsider, b"x").expect("Failed to write outsider");

        let options = PassOptions::default();
        let record = mirror_entry(&file_entry(outsider), &roots.src, &roots.dst, &options);
        assert_eq!(record.state, EntryState::Failed);
        assert!(record.action.is_none());
    }

    #[test]
    fn test_comparison_error_means_recopy() {
        let err = EngineError::ReadError {
            path: PathBuf::from("backup.txt"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "device went away"),
        };
        let (verdict, message) = verdict_or_recopy(Err(err), Path::new("source.txt"));
        assert_eq!(verdict, Verdict::Different);
        assert!(message.expect("cause should be kept").contains("device went away"));

        let (verdict, message) = verdict_or_recopy(Ok(Verdict::Same), Path::new("source.txt"));
        assert_eq!(verdict, Verdict::Same);
        assert!(message.is_none());
    }

    #[test]
    fn test_run_pass_rejects_missing_source() {
        let roots = roots();
        let config = BackupConfig::new(roots.src.join("missing"), roots.dst.clone(), 1);

        let result = run_pass(&config, &PassOptions::default(), None);
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    #[test]
    fn test_other_algorithms_detect_changes() {
        for algorithm in [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Blake3] {
            let roots = roots();
            fs::write(roots.src.join("f.txt"), b"new").expect("Failed to write source");
            fs::write(roots.dst.join("f.txt"), b"old").expect("Failed to write backup");

            let config = BackupConfig::new(roots.src.clone(), roots.dst.clone(), 1);
            let options = PassOptions {
                checksum_algorithm: algorithm,
                preserve_mtime: false,
            };
            let report = run_pass(&config, &options, None).expect("Pass should run");

            assert_eq!(report.files_copied_changed, 1, "{} missed the change", algorithm);
            assert_eq!(fs::read(roots.dst.join("f.txt")).expect("Failed to read backup"), b"new");
        }
    }

    struct TestProgressCallback {
        calls: Mutex<Vec<String>>,
    }

    impl ProgressCallback for TestProgressCallback {
        fn on_pass_started(&self, _report: &PassReport) {
            self.calls.lock().unwrap().push("on_pass_started".to_string());
        }

        fn on_entry_completed(
            &self,
            _report: &PassReport,
            entry_index: usize,
            _record: &EntryRecord,
        ) {
            self.calls.lock().unwrap().push(format!("on_entry_completed({})", entry_index));
        }

        fn on_pass_completed(&self, _report: &PassReport) {
            self.calls.lock().unwrap().push("on_pass_completed".to_string());
        }
    }

    #[test]
    fn test_run_pass_invokes_callbacks_in_order() {
        let roots = roots();
        fs::write(roots.src.join("file1.txt"), b"test").expect("Failed to write file1");

        let progress = TestProgressCallback {
            calls: Mutex::new(Vec::new()),
        };
        let config = BackupConfig::new(roots.src.clone(), roots.dst.clone(), 1);
        run_pass(&config, &PassOptions::default(), Some(&progress)).expect("Pass should run");

        let calls = progress.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "on_pass_started".to_string(),
                "on_entry_completed(0)".to_string(),
                "on_entry_completed(1)".to_string(),
                "on_pass_completed".to_string(),
            ]
        );
    }

    #[test]
    fn test_run_pass_rejects_backup_inside_source() {
        let roots = roots();
        fs::write(roots.src.join("f1.txt"), b"A").expect("Failed to write f1");
        let nested = roots.src.join("backup");

        let config = BackupConfig::new(roots.src.clone(), nested.clone(), 1);
        let result = run_pass(&config, &PassOptions::default(), None);

        assert!(matches!(result, Err(EngineError::InvalidPath { .. })));
        assert!(!nested.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_pass_completes_with_fifo_in_source() {
        let roots = roots();
        let status = std::process::Command::new("mkfifo")
            .arg(roots.src.join("pipe"))
            .status()
            .expect("Failed to run mkfifo");
        assert!(status.success(), "mkfifo failed");
        fs::write(roots.src.join("plain.txt"), b"plain").expect("Failed to write plain");

        let config = BackupConfig::new(roots.src.clone(), roots.dst.clone(), 1);
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(run_pass(&config, &PassOptions::default(), None));
        });

        let report = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("Pass should not block on a FIFO")
            .expect("Pass should run");
        assert!(report.is_clean());
        assert_eq!(report.files_copied_new, 1);
        assert_eq!(read_backup(&roots, "plain.txt"), b"plain");
        assert!(fs::symlink_metadata(roots.dst.join("pipe")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_comparison_is_recopied_and_counted() {
        let roots = roots();
        fs::write(roots.src.join("f.txt"), b"fresh").expect("Failed to write source");
        // Dangling link: the slot is occupied but its content cannot be read
        let target = roots._temp_dir.path().join("elsewhere.txt");
        std::os::unix::fs::symlink(&target, roots.dst.join("f.txt"))
            .expect("Failed to create backup symlink");

        let report = pass(&roots);

        assert_eq!(report.comparison_errors, 1);
        assert_eq!(report.files_copied_changed, 1);
        assert_eq!(report.files_copied_new, 0);
        assert!(report.is_clean());
        assert_eq!(fs::read(&target).expect("Failed to read recopied file"), b"fresh");
    }

    #[cfg(unix)]
    #[test]
    fn test_mirror_entry_keeps_comparison_error() {
        let roots = roots();
        let source = roots.src.join("f.txt");
        fs::write(&source, b"fresh").expect("Failed to write source");
        let target = roots._temp_dir.path().join("elsewhere.txt");
        std::os::unix::fs::symlink(&target, roots.dst.join("f.txt"))
            .expect("Failed to create backup symlink");

        let options = PassOptions::default();
        let record = mirror_entry(&file_entry(source), &roots.src, &roots.dst, &options);

        assert_eq!(record.action, Some(MirrorAction::CopyChanged));
        assert_eq!(record.state, EntryState::Done);
        assert_eq!(record.bytes_copied, 5);
        let message = record.comparison_error.expect("comparison error should be recorded");
        assert!(message.contains("f.txt"), "unexpected message: {}", message);
    }

    /// A directory made unreadable for the duration of a test.
    #[cfg(unix)]
    struct Unreadable(PathBuf);

    #[cfg(unix)]
    impl Unreadable {
        /// Returns `None` when the mode bits do not stop the current user.
        fn lock(path: PathBuf) -> Option<Self> {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o000))
                .expect("Failed to lock directory");
            let guard = Unreadable(path);
            if fs::read_dir(&guard.0).is_ok() {
                return None;
            }
            Some(guard)
        }
    }

    #[cfg(unix)]
    impl Drop for Unreadable {
        fn drop(&mut self) {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.0, fs::Permissions::from_mode(0o755));
        }
    }

    #[cfg(unix)]
    fn roots_with_locked_dir() -> Option<(Roots, Unreadable)> {
        let roots = roots();
        let locked = roots.src.join("locked");
        fs::create_dir(&locked).expect("Failed to create locked");
        fs::write(locked.join("hidden.txt"), b"hidden").expect("Failed to write hidden");
        fs::write(roots.src.join("z.txt"), b"z").expect("Failed to write z");
        let guard = Unreadable::lock(locked)?;
        Some((roots, guard))
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported_and_pass_continues() {
        let (roots, _guard) = match roots_with_locked_dir() {
            Some(setup) => setup,
            None => return,
        };

        let report = pass(&roots);

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failures[0].path, roots.src.join("locked"));
        assert!(roots.dst.join("locked").is_dir());
        assert!(!roots.dst.join("locked/hidden.txt").exists());
        assert_eq!(report.files_copied_new, 1);
        assert_eq!(read_backup(&roots, "z.txt"), b"z");
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_indices_skip_walk_errors() {
        let (roots, _guard) = match roots_with_locked_dir() {
            Some(setup) => setup,
            None => return,
        };

        let progress = TestProgressCallback {
            calls: Mutex::new(Vec::new()),
        };
        let config = BackupConfig::new(roots.src.clone(), roots.dst.clone(), 1);
        let report =
            run_pass(&config, &PassOptions::default(), Some(&progress)).expect("Pass should run");

        assert_eq!(report.failed_count(), 1);
        let calls = progress.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "on_pass_started".to_string(),
                "on_entry_completed(0)".to_string(),
                "on_entry_completed(1)".to_string(),
                "on_entry_completed(2)".to_string(),
                "on_pass_completed".to_string(),
            ]
        );
    }
}
