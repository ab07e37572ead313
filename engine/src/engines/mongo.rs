//! MongoDB adapter (`mongosh`, `mongodump`, `mongorestore`).
//!
//! Whole-server backups are a single `mongodump --archive` stream rather
//! than one file per database. Credentials are passed as explicit arguments
//! authenticated against `admin`.

use super::{parse_listing, DatabaseEngine, EngineContext, EngineRegistry};
use crate::catalog::sanitize_component;
use crate::error::Result;
use crate::model::{BackupResult, ConnectionProfile};
use crate::pipeline::ToolCommand;
use std::path::Path;

pub const ID: &str = "mongo";

/// Target name recorded for a whole-server archive.
pub const ALL_DATABASES: &str = "all";

const SYSTEM_DATABASES: &[&str] = &["admin", "config", "local"];
const LIST_SCRIPT: &str = "db.adminCommand('listDatabases').databases.forEach(d => print(d.name))";

pub fn register(registry: &mut EngineRegistry) {
    registry.register(ID, |ctx| Box::new(MongoEngine::new(ctx.clone())));
}

pub struct MongoEngine {
    ctx: EngineContext,
}

impl MongoEngine {
    pub fn new(ctx: EngineContext) -> Self {
        MongoEngine { ctx }
    }

    fn command(program: &str, profile: &ConnectionProfile) -> ToolCommand {
        ToolCommand::new(program)
            .args(["--host", profile.host.as_str()])
            .args(["--port".to_string(), profile.port.to_string()])
            .args(["--username", profile.user.as_str()])
            .args(["--password", profile.password.as_str()])
            .args(["--authenticationDatabase", "admin"])
    }
}

impl DatabaseEngine for MongoEngine {
    fn id(&self) -> &'static str {
        ID
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["mongosh", "mongodump", "mongorestore"]
    }

    fn file_name(&self, database: &str, stamp: &str) -> String {
        format!("{}_{}.archive.gz", sanitize_component(database), stamp)
    }

    fn list_databases(&self, profile: &ConnectionProfile) -> Result<Vec<String>> {
        let command = Self::command("mongosh", profile).args(["--eval", LIST_SCRIPT, "--quiet"]);
        let output = self.ctx.runner.capture(&command)?;
        Ok(parse_listing(&output, SYSTEM_DATABASES))
    }

    fn backup_database(
        &self,
        profile: &ConnectionProfile,
        database: &str,
        destination: &Path,
    ) -> Result<()> {
        let command = Self::command("mongodump", profile).args(["--archive", "--db", database]);
        self.ctx.dump_with_retry(database, &command, destination)
    }

    /// One archive of the whole server, reported under the target `all`.
    fn backup_all(
        &self,
        profile: &ConnectionProfile,
        destination_dir: &Path,
        stamp: &str,
    ) -> Result<Vec<BackupResult>> {
        let file_name = self.file_name("all-databases", stamp);
        let command = Self::command("mongodump", profile).arg("--archive");
        let outcome = self
            .ctx
            .dump_with_retry(ALL_DATABASES, &command, &destination_dir.join(&file_name));
        if let Err(e) = &outcome {
            tracing::warn!(engine = ID, error = %e, "server archive failed");
        }

        Ok(vec![BackupResult {
            database: ALL_DATABASES.to_string(),
            file_name,
            outcome,
        }])
    }

    fn restore_backup(
        &self,
        profile: &ConnectionProfile,
        file: &Path,
        target_database: Option<&str>,
    ) -> Result<()> {
        if let Some(target) = target_database {
            tracing::debug!(target_database = target, "archives restore their recorded namespaces; target ignored");
        }
        let command = Self::command("mongorestore", profile).args(["--archive", "--nsInclude=*"]);
        self.ctx.runner.restore_from_file(&command, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::testing::{context, profile, ScriptedRunner};
    use std::sync::Arc;

    #[test]
    fn test_list_filters_internal_namespaces() {
        let runner = Arc::new(ScriptedRunner::new().with_listing("admin\nconfig\nlocal\nshop\nevents\n"));
        let engine = MongoEngine::new(context(runner.clone()));

        let dbs = engine.list_databases(&profile(ID)).expect("listing");
        assert_eq!(dbs, vec!["shop", "events"]);

        let command = &runner.recorded()[0];
        assert_eq!(command.program, "mongosh");
        assert!(command.args.contains(&"--authenticationDatabase".to_string()));
        assert!(command.env.is_empty());
        assert!(!command.to_string().contains("pa55"));
    }

    #[test]
    fn test_backup_all_is_single_archive() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let runner = Arc::new(ScriptedRunner::new());
        let engine = MongoEngine::new(context(runner.clone()));

        let results = engine
            .backup_all(&profile(ID), temp_dir.path(), "2024-05-01T10-00-00Z")
            .expect("backup_all");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].database, "all");
        assert_eq!(results[0].file_name, "all-databases_2024-05-01T10-00-00Z.archive.gz");
        assert!(results[0].is_success());
        assert!(temp_dir.path().join(&results[0].file_name).exists());

        let commands = runner.recorded();
        assert_eq!(commands.len(), 1, "no listing call for whole-server dumps");
        assert_eq!(commands[0].program, "mongodump");
        assert_eq!(commands[0].args.last().map(String::as_str), Some("--archive"));
    }

    #[test]
    fn test_backup_database_uses_archive_name() {
        let engine = MongoEngine::new(context(Arc::new(ScriptedRunner::new())));
        assert_eq!(engine.file_name("shop", "T"), "shop_T.archive.gz");
        assert_eq!(engine.file_name("../shop", "T"), "..-shop_T.archive.gz");
    }

    #[test]
    fn test_restore_uses_archive_mode() {
        let runner = Arc::new(ScriptedRunner::new());
        let engine = MongoEngine::new(context(runner.clone()));

        engine
            .restore_backup(&profile(ID), Path::new("all.archive.gz"), Some("ignored"))
            .expect("restore");

        let restores = runner.restores.lock().unwrap();
        assert_eq!(restores[0].0.program, "mongorestore");
        assert!(restores[0].0.args.ends_with(&["--archive".to_string(), "--nsInclude=*".to_string()]));
    }
}
