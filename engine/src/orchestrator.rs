//! Backup and restore orchestration.
//!
//! A backup run resolves the adapter for the profile's engine, creates the
//! run directory, dumps every target (or the single requested one), derives
//! a file record per target and commits the run's metadata record exactly
//! once. Per-target failures become failed records; anything else aborts
//! the run before commit.

use crate::catalog::{BackupCatalog, RunDir};
use crate::checksums::{self, ChecksumAlgorithm};
use crate::config::EngineSettings;
use crate::engines::{DatabaseEngine, EngineContext, EngineRegistry};
use crate::error::{EngineError, Result};
use crate::model::{BackupFileRecord, BackupResult, ConnectionProfile, RunMetadata};
use crate::pipeline::SystemRunner;
use crate::progress::ProgressCallback;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub struct Orchestrator {
    registry: EngineRegistry,
    catalog: BackupCatalog,
    checksum: ChecksumAlgorithm,
}

impl Orchestrator {
    pub fn new(registry: EngineRegistry, catalog: BackupCatalog, checksum: ChecksumAlgorithm) -> Self {
        Orchestrator {
            registry,
            catalog,
            checksum,
        }
    }

    /// Built-in engines running real tools, configured from `settings`.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let runner = Arc::new(SystemRunner::new(settings.compression_level));
        let registry = EngineRegistry::with_builtin_engines(EngineContext::new(runner, settings.retry));
        Self::new(
            registry,
            BackupCatalog::new(&settings.backup_root),
            settings.checksum,
        )
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &BackupCatalog {
        &self.catalog
    }

    /// Back up `profile` now; see `run_backup_at`.
    pub fn run_backup(
        &self,
        profile: ConnectionProfile,
        database: Option<&str>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<RunMetadata> {
        self.run_backup_at(profile, database, Utc::now(), progress)
    }

    /// Back up one database, or every database when `database` is None, as
    /// a run stamped `at`.
    ///
    /// # Errors
    /// - `EngineNotFound` if the profile's engine is not registered
    /// - `DirectoryCreate` if the run directory cannot be created
    /// - `CriticalEnumeration` if the databases cannot be listed (nothing is
    ///   committed)
    /// - `MetadataWrite` if the record cannot be committed
    ///
    /// Failed dumps are not errors: they appear as failed records and in the
    /// run status.
    pub fn run_backup_at(
        &self,
        profile: ConnectionProfile,
        database: Option<&str>,
        at: DateTime<Utc>,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<RunMetadata> {
        let engine = self.registry.resolve(&profile.engine)?;
        let run = self.catalog.create_run_dir(engine.id(), &profile.host, at)?;

        tracing::info!(
            engine = engine.id(),
            host = %profile.host,
            database = database.unwrap_or("*"),
            dir = %run.path.display(),
            "starting backup"
        );
        if let Some(callback) = progress {
            callback.on_run_started(engine.id(), &profile.host, &run.path);
        }

        let results = match database {
            Some(name) => vec![self.backup_single(engine.as_ref(), &profile, name, &run)?],
            None => engine
                .backup_all(&profile, &run.path, &run.timestamp)
                .map_err(|source| EngineError::CriticalEnumeration {
                    engine: engine.id().to_string(),
                    source: Box::new(source),
                })?,
        };

        let mut files = Vec::with_capacity(results.len());
        for result in results {
            let record = self.file_record(&run, result.file_name, result.outcome);
            if let Some(callback) = progress {
                callback.on_target_completed(&result.database, &record);
            }
            files.push(record);
        }

        let mut committed = profile;
        committed.engine = engine.id().to_string();
        let metadata = RunMetadata::new(&committed, &run.timestamp, files);
        self.catalog.commit(&run, &metadata)?;

        tracing::info!(run = %metadata.id, status = %metadata.status, files = metadata.files.len(), "backup finished");
        if let Some(callback) = progress {
            callback.on_run_completed(&metadata);
        }
        Ok(metadata)
    }

    fn backup_single(
        &self,
        engine: &dyn DatabaseEngine,
        profile: &ConnectionProfile,
        database: &str,
        run: &RunDir,
    ) -> Result<BackupResult> {
        let file_name = engine.file_name(database, &run.timestamp);
        let outcome = engine.backup_database(profile, database, &run.path.join(&file_name));
        match outcome {
            Err(e) if !e.is_target_failure() => Err(e),
            outcome => Ok(BackupResult {
                database: database.to_string(),
                file_name,
                outcome,
            }),
        }
    }

    /// Checksum and size come from the file as it is on disk now. A file
    /// that cannot be read back is recorded as failed.
    fn file_record(&self, run: &RunDir, file_name: String, outcome: Result<()>) -> BackupFileRecord {
        if let Err(e) = outcome {
            return BackupFileRecord::failed(file_name, e.to_string());
        }

        let path = run.path.join(&file_name);
        let measured = checksums::digest(&path, self.checksum).and_then(|checksum| {
            let size = fs::metadata(&path)
                .map_err(|source| EngineError::ChecksumRead {
                    path: path.clone(),
                    source,
                })?
                .len();
            Ok((checksum, size))
        });

        match measured {
            Ok((checksum, size)) => BackupFileRecord::succeeded(file_name, checksum, size),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "dump finished but cannot be measured");
                BackupFileRecord::failed(file_name, e.to_string())
            }
        }
    }

    /// Restore `backup_file` into the server described by `profile`.
    ///
    /// The adapter is resolved before the file is touched. Restores are not
    /// retried and not recorded in the catalog.
    pub fn run_restore(
        &self,
        profile: ConnectionProfile,
        backup_file: &Path,
        target_database: Option<&str>,
    ) -> Result<()> {
        let engine = self.registry.resolve(&profile.engine)?;
        tracing::info!(
            engine = engine.id(),
            host = %profile.host,
            file = %backup_file.display(),
            "starting restore"
        );
        engine.restore_backup(&profile, backup_file, target_database)?;
        tracing::info!(engine = engine.id(), host = %profile.host, "restore finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testing::{context, profile, ScriptedRunner};
    use crate::model::{FileStatus, RunStatus};
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn orchestrator(runner: Arc<ScriptedRunner>, root: &Path) -> Orchestrator {
        Orchestrator::new(
            EngineRegistry::with_builtin_engines(context(runner)),
            BackupCatalog::new(root),
            ChecksumAlgorithm::Sha256,
        )
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for RecordingProgress {
        fn on_run_started(&self, engine: &str, host: &str, _run_dir: &Path) {
            self.events.lock().unwrap().push(format!("started {} {}", engine, host));
        }

        fn on_target_completed(&self, database: &str, record: &BackupFileRecord) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{} {:?}", database, record.status));
        }

        fn on_run_completed(&self, metadata: &RunMetadata) {
            self.events.lock().unwrap().push(format!("completed {}", metadata.status));
        }
    }

    #[test]
    fn test_partial_run_records_each_target() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new().with_listing("app\nbilling\n").failing("billing", 10));
        let orch = orchestrator(runner, temp_dir.path());
        let progress = RecordingProgress::default();

        let meta = orch
            .run_backup_at(profile("mysql"), None, at(), Some(&progress))
            .expect("run completes");

        assert_eq!(meta.status, RunStatus::Partial);
        assert_eq!(meta.files.len(), 2);

        let run_dir = temp_dir.path().join("mysql").join("source-db.internal_2024-05-01T10-00-00Z");
        let app = &meta.files[0];
        assert_eq!(app.name, "app_2024-05-01T10-00-00Z.sql.gz");
        assert_eq!(app.status, FileStatus::Success);
        let on_disk = run_dir.join(&app.name);
        assert_eq!(
            app.checksum,
            checksums::digest(&on_disk, ChecksumAlgorithm::Sha256).expect("digest")
        );
        assert_eq!(app.size, fs::metadata(&on_disk).expect("stat").len());

        let billing = &meta.files[1];
        assert_eq!(billing.status, FileStatus::Failed);
        assert!(billing.checksum.is_empty());
        assert_eq!(billing.size, 0);
        assert!(billing.error.as_deref().unwrap_or_default().contains("connection reset"));

        let committed = BackupCatalog::load(&run_dir.join("metadata.json")).expect("committed record");
        assert_eq!(committed, meta);

        assert_eq!(
            *progress.events.lock().unwrap(),
            vec![
                "started mysql db.internal".to_string(),
                "app Success".to_string(),
                "billing Failed".to_string(),
                "completed partial".to_string(),
            ]
        );
    }

    #[test]
    fn test_all_targets_succeed() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new().with_listing(" app\n reports\n"));
        let orch = orchestrator(runner, temp_dir.path());

        let meta = orch
            .run_backup_at(profile("postgres"), None, at(), None)
            .expect("run completes");

        assert_eq!(meta.status, RunStatus::Success);
        assert!(meta.files.iter().all(|f| f.checksum.starts_with("sha256:") && f.size > 0));
        assert_eq!(meta.id, "postgres_db.internal_2024-05-01T10-00-00Z");
    }

    #[test]
    fn test_retried_dump_is_recorded_as_success() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new().failing("app", 2));
        let orch = orchestrator(runner, temp_dir.path());

        let meta = orch
            .run_backup_at(profile("postgres"), Some("app"), at(), None)
            .expect("run completes");

        assert_eq!(meta.status, RunStatus::Success);
        let run_dir = temp_dir.path().join("postgres").join("source-db.internal_2024-05-01T10-00-00Z");
        let content = fs::read_to_string(run_dir.join(&meta.files[0].name)).expect("dump");
        assert!(!content.starts_with("truncated"));
        assert!(!run_dir.join(format!("{}.partial", meta.files[0].name)).exists());
    }

    #[test]
    fn test_single_database_failure_is_failed_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new().failing("shop", 10));
        let orch = orchestrator(runner.clone(), temp_dir.path());

        let meta = orch
            .run_backup_at(profile("mongo"), Some("shop"), at(), None)
            .expect("run completes");

        assert_eq!(meta.status, RunStatus::Failed);
        assert_eq!(meta.files.len(), 1);
        assert_eq!(meta.files[0].name, "shop_2024-05-01T10-00-00Z.archive.gz");
        assert_eq!(runner.recorded().len(), 3, "dump retried before giving up");
    }

    #[test]
    fn test_failed_server_archive_is_committed_as_failed_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        // Every mongodump invocation carries --archive
        let runner = Arc::new(ScriptedRunner::new().failing("--archive", 10));
        let orch = orchestrator(runner.clone(), temp_dir.path());

        let meta = orch
            .run_backup_at(profile("mongo"), None, at(), None)
            .expect("run completes");

        assert_eq!(meta.status, RunStatus::Failed);
        assert_eq!(meta.files.len(), 1);
        let record = &meta.files[0];
        assert_eq!(record.name, "all-databases_2024-05-01T10-00-00Z.archive.gz");
        assert_eq!(record.status, FileStatus::Failed);
        assert!(record.checksum.is_empty());
        assert_eq!(record.size, 0);
        assert_eq!(runner.recorded().len(), 3, "archive retried before giving up");

        let run_dir = temp_dir.path().join("mongo").join("source-db.internal_2024-05-01T10-00-00Z");
        let committed = BackupCatalog::load(&run_dir.join("metadata.json")).expect("committed record");
        assert_eq!(committed, meta);
        assert!(!run_dir.join(&record.name).exists());
    }

    #[test]
    fn test_listing_failure_commits_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new().with_listing_error("authentication failed"));
        let orch = orchestrator(runner, temp_dir.path());

        let result = orch.run_backup_at(profile("mysql"), None, at(), None);

        match result {
            Err(EngineError::CriticalEnumeration { engine, source }) => {
                assert_eq!(engine, "mysql");
                assert!(source.to_string().contains("authentication failed"));
            }
            other => panic!("expected CriticalEnumeration, got {:?}", other),
        }
        let run_dir = temp_dir.path().join("mysql").join("source-db.internal_2024-05-01T10-00-00Z");
        assert!(!run_dir.join("metadata.json").exists());
        assert!(orch.catalog().list_runs().expect("list").is_empty());
    }

    #[test]
    fn test_unknown_engine_creates_no_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let orch = orchestrator(Arc::new(ScriptedRunner::new()), temp_dir.path());

        let result = orch.run_backup_at(profile("oracle"), None, at(), None);

        assert!(matches!(result, Err(EngineError::EngineNotFound { .. })));
        assert_eq!(fs::read_dir(temp_dir.path()).expect("read").count(), 0);
    }

    #[test]
    fn test_restore_unknown_engine_fails_before_io() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new());
        let orch = orchestrator(runner.clone(), temp_dir.path());

        let result = orch.run_restore(profile("cassandra"), &temp_dir.path().join("absent.gz"), None);

        assert!(matches!(result, Err(EngineError::EngineNotFound { .. })));
        assert!(runner.restores.lock().unwrap().is_empty());
        assert!(runner.recorded().is_empty());
    }

    #[test]
    fn test_restore_delegates_to_adapter() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new());
        let orch = orchestrator(runner.clone(), temp_dir.path());
        let file = temp_dir.path().join("app.sql.gz");

        orch.run_restore(profile("postgres"), &file, None).expect("restore");

        let restores = runner.restores.lock().unwrap();
        assert_eq!(restores.len(), 1);
        assert_eq!(restores[0].1, file);
        assert!(orch.catalog().list_runs().expect("list").is_empty());
    }
}
