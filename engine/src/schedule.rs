//! Pass scheduling.
//!
//! The scheduler runs one pass immediately and then one pass per interval.
//! The wait starts only after a pass has finished, so passes never overlap.
//! The configuration is reloaded before every scheduled pass.

use crate::config::BackupConfig;
use crate::error::EngineError;
use crate::mirror::{run_pass, PassOptions};
use crate::model::PassReport;
use crate::progress::ProgressCallback;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Drives backup passes from a configuration file.
pub struct Scheduler<'a> {
    config_path: PathBuf,
    options: PassOptions,
    progress: Option<&'a dyn ProgressCallback>,
}

impl<'a> Scheduler<'a> {
    pub fn new<P: Into<PathBuf>>(config_path: P, options: PassOptions) -> Self {
        Scheduler {
            config_path: config_path.into(),
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Load a fresh configuration snapshot and run one pass with it.
    pub fn run_once(&self) -> Result<PassReport, EngineError> {
        let config = BackupConfig::load(&self.config_path)?;
        self.pass(&config)
    }

    fn pass(&self, config: &BackupConfig) -> Result<PassReport, EngineError> {
        run_pass(config, &self.options, self.progress)
    }

    /// Run the startup pass and then keep running passes on schedule.
    ///
    /// `sleep` is called with the interval between passes and returns `false`
    /// to stop the loop. An interval of zero hours runs only the startup pass.
    ///
    /// # Returns
    /// Number of passes run
    ///
    /// # Errors
    /// Only the startup pass can fail the scheduler. Later configuration or
    /// pass errors are logged; a configuration that fails to reload is
    /// replaced by the previous snapshot for that tick.
    pub fn run<S>(&self, initial: BackupConfig, mut sleep: S) -> Result<usize, EngineError>
    where
        S: FnMut(Duration) -> bool,
    {
        let mut config = initial;
        self.pass(&config)?;
        let mut passes = 1;

        loop {
            let interval = config.interval();
            if interval.is_zero() {
                info!("timeBetweenBackups is 0, not scheduling further passes");
                return Ok(passes);
            }

            info!(hours = config.time_between_backups, "next pass scheduled");
            if !sleep(interval) {
                return Ok(passes);
            }

            match BackupConfig::load(&self.config_path) {
                Ok(reloaded) => {
                    if reloaded != config {
                        info!(path = %self.config_path.display(), "configuration changed");
                    }
                    config = reloaded;
                }
                Err(e) => warn!(
                    path = %self.config_path.display(),
                    error = %e.detailed_message(),
                    "failed to reload configuration, keeping previous"
                ),
            }

            match self.pass(&config) {
                Ok(report) if !report.is_clean() => warn!(
                    pass = %report.id,
                    failed = report.failed_count(),
                    "pass finished with failures"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e.detailed_message(), "pass could not run"),
            }
            passes += 1;
        }
    }
}
