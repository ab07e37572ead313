//! Database engine adapters.
//!
//! Each supported server kind implements `DatabaseEngine`, which normalizes
//! the native listing, dump and restore tools behind one contract. Adapters
//! describe their commands and delegate execution to the shared
//! `ToolRunner`, so compression and error classification live in one place.

pub mod mongo;
pub mod mysql;
pub mod postgres;
pub mod registry;

pub use registry::{EngineFactory, EngineRegistry};

use crate::catalog::sanitize_component;
use crate::error::{EngineError, PipelinePhase, Result};
use crate::model::{BackupResult, ConnectionProfile};
use crate::pipeline::{ToolCommand, ToolRunner};
use crate::retry::RetryPolicy;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Contract implemented once per database engine.
pub trait DatabaseEngine: Send + Sync {
    /// Stable lowercase name used for routing and directory naming.
    fn id(&self) -> &'static str;

    /// External programs this adapter shells out to.
    fn required_tools(&self) -> &'static [&'static str];

    /// Output file name for one database dumped at `stamp`. The database
    /// part is sanitized; tools still receive the raw name.
    fn file_name(&self, database: &str, stamp: &str) -> String {
        format!("{}_{}.sql.gz", sanitize_component(database), stamp)
    }

    /// Databases visible on the server, minus engine-internal ones.
    fn list_databases(&self, profile: &ConnectionProfile) -> Result<Vec<String>>;

    /// Dump exactly one database into `destination` as a gzip stream.
    fn backup_database(
        &self,
        profile: &ConnectionProfile,
        database: &str,
        destination: &Path,
    ) -> Result<()>;

    /// Dump every database into `destination_dir`, one result per target.
    ///
    /// Listing failures are returned as errors; a failed dump only marks its
    /// own result as failed.
    fn backup_all(
        &self,
        profile: &ConnectionProfile,
        destination_dir: &Path,
        stamp: &str,
    ) -> Result<Vec<BackupResult>> {
        let databases = self.list_databases(profile)?;
        Ok(backup_each(self, profile, &databases, destination_dir, stamp))
    }

    /// Feed a compressed dump into the restore tool. `target_database` is
    /// advisory; dumps that create their own database ignore it.
    fn restore_backup(
        &self,
        profile: &ConnectionProfile,
        file: &Path,
        target_database: Option<&str>,
    ) -> Result<()>;
}

/// Shared services handed to every adapter at construction.
#[derive(Clone)]
pub struct EngineContext {
    pub runner: Arc<dyn ToolRunner>,
    pub retry: RetryPolicy,
}

impl EngineContext {
    pub fn new(runner: Arc<dyn ToolRunner>, retry: RetryPolicy) -> Self {
        EngineContext { runner, retry }
    }

    /// Dump with retries, staging each attempt in `<destination>.partial`.
    ///
    /// Only a fully successful attempt is renamed onto `destination`. When
    /// every attempt fails the staging file stays behind for diagnosis.
    pub fn dump_with_retry(
        &self,
        label: &str,
        command: &ToolCommand,
        destination: &Path,
    ) -> Result<()> {
        let staging = staging_path(destination);
        self.retry.run(label, |_| {
            self.runner.dump_to_file(command, &staging)?;
            fs::rename(&staging, destination)
                .map_err(|e| EngineError::pipeline(PipelinePhase::Finish, destination, e))
        })
    }
}

pub(crate) fn staging_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(".partial");
    destination.with_file_name(name)
}

/// Dump `databases` one after another, isolating failures per target.
pub fn backup_each<E: DatabaseEngine + ?Sized>(
    engine: &E,
    profile: &ConnectionProfile,
    databases: &[String],
    destination_dir: &Path,
    stamp: &str,
) -> Vec<BackupResult> {
    databases
        .iter()
        .map(|database| {
            let file_name = engine.file_name(database, stamp);
            let outcome = engine.backup_database(profile, database, &destination_dir.join(&file_name));
            match &outcome {
                Ok(()) => tracing::info!(engine = engine.id(), database = %database, "dump finished"),
                Err(e) => tracing::warn!(engine = engine.id(), database = %database, error = %e, "dump failed"),
            }
            BackupResult {
                database: database.clone(),
                file_name,
                outcome,
            }
        })
        .collect()
}

/// One database name per non-empty line, minus the `excluded` names.
pub(crate) fn parse_listing(output: &str, excluded: &[&str]) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !excluded.contains(name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted `ToolRunner` shared by adapter and orchestrator tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub struct ScriptedRunner {
        listing: Mutex<Option<Result<String>>>,
        /// Databases (matched against any argument) whose dumps fail, with the
        /// number of failures before they start succeeding.
        failures: Mutex<HashMap<String, u32>>,
        pub commands: Mutex<Vec<ToolCommand>>,
        pub restores: Mutex<Vec<(ToolCommand, PathBuf)>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            ScriptedRunner {
                listing: Mutex::new(None),
                failures: Mutex::new(HashMap::new()),
                commands: Mutex::new(Vec::new()),
                restores: Mutex::new(Vec::new()),
            }
        }

        pub fn with_listing(self, output: &str) -> Self {
            *self.listing.lock().unwrap() = Some(Ok(output.to_string()));
            self
        }

        pub fn with_listing_error(self, output: &str) -> Self {
            *self.listing.lock().unwrap() = Some(Err(EngineError::ToolInvocation {
                program: "lister".to_string(),
                code: Some(1),
                output: output.to_string(),
            }));
            self
        }

        /// Fail dumps mentioning `database` the first `times` attempts.
        pub fn failing(self, database: &str, times: u32) -> Self {
            self.failures.lock().unwrap().insert(database.to_string(), times);
            self
        }

        pub fn recorded(&self) -> Vec<ToolCommand> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn capture(&self, command: &ToolCommand) -> Result<String> {
            self.commands.lock().unwrap().push(command.clone());
            match self.listing.lock().unwrap().take() {
                Some(result) => result,
                None => Ok(String::new()),
            }
        }

        fn dump_to_file(&self, command: &ToolCommand, destination: &Path) -> Result<()> {
            self.commands.lock().unwrap().push(command.clone());
            let mut failures = self.failures.lock().unwrap();
            let failing = failures
                .iter_mut()
                .find(|(db, remaining)| **remaining > 0 && command.args.iter().any(|a| a == *db));
            if let Some((db, remaining)) = failing {
                *remaining -= 1;
                fs::write(destination, format!("truncated {}", db))
                    .map_err(|e| EngineError::pipeline(PipelinePhase::CreateOutput, destination, e))?;
                return Err(EngineError::ToolInvocation {
                    program: command.program.clone(),
                    code: Some(2),
                    output: format!("connection reset while dumping {}", db),
                });
            }
            let payload = format!("dump of {}", command.args.join(" "));
            fs::write(destination, payload)
                .map_err(|e| EngineError::pipeline(PipelinePhase::CreateOutput, destination, e))?;
            Ok(())
        }

        fn restore_from_file(&self, command: &ToolCommand, source: &Path) -> Result<()> {
            self.restores
                .lock()
                .unwrap()
                .push((command.clone(), source.to_path_buf()));
            Ok(())
        }
    }

    pub fn context(runner: Arc<ScriptedRunner>) -> EngineContext {
        EngineContext::new(
            runner,
            RetryPolicy {
                max_attempts: 3,
                base_delay_secs: 0,
            },
        )
    }

    pub fn profile(engine: &str) -> ConnectionProfile {
        ConnectionProfile {
            id: "source".to_string(),
            engine: engine.to_string(),
            host: "db.internal".to_string(),
            port: 5000,
            user: "backup".to_string(),
            password: "pa55".to_string(),
        }
    }
}
