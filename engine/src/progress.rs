//! Progress reporting trait.
//!
//! Decouples the orchestrator from whatever surface reports run progress
//! (CLI output, logs, a future UI). All methods are called synchronously
//! from the thread running the backup.

use crate::model::{BackupFileRecord, RunMetadata};
use std::path::Path;

pub trait ProgressCallback {
    /// Called once the run directory exists, before any dump starts.
    fn on_run_started(&self, engine: &str, host: &str, run_dir: &Path);

    /// Called for each target once its file record is final.
    fn on_target_completed(&self, database: &str, record: &BackupFileRecord);

    /// Called after the run's metadata record has been committed.
    fn on_run_completed(&self, metadata: &RunMetadata);
}
