//! MySQL / MariaDB adapter (`mysql`, `mysqldump`).
//!
//! The password travels in `MYSQL_PWD` so it never appears in the process
//! list. Dumps use `--databases`, which embeds `CREATE DATABASE`/`USE`, so
//! restores replay into the original database name.

use super::{parse_listing, DatabaseEngine, EngineContext, EngineRegistry};
use crate::error::Result;
use crate::model::ConnectionProfile;
use crate::pipeline::ToolCommand;
use std::path::Path;

pub const ID: &str = "mysql";

const SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

pub fn register(registry: &mut EngineRegistry) {
    registry.register(ID, |ctx| Box::new(MySqlEngine::new(ctx.clone())));
}

pub struct MySqlEngine {
    ctx: EngineContext,
}

impl MySqlEngine {
    pub fn new(ctx: EngineContext) -> Self {
        MySqlEngine { ctx }
    }

    fn command(program: &str, profile: &ConnectionProfile) -> ToolCommand {
        ToolCommand::new(program)
            .args(["-h", profile.host.as_str()])
            .args(["-P".to_string(), profile.port.to_string()])
            .args(["-u", profile.user.as_str()])
            .env("MYSQL_PWD", profile.password.as_str())
    }
}

impl DatabaseEngine for MySqlEngine {
    fn id(&self) -> &'static str {
        ID
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["mysql", "mysqldump"]
    }

    fn list_databases(&self, profile: &ConnectionProfile) -> Result<Vec<String>> {
        let command = Self::command("mysql", profile).args([
            "-e",
            "SHOW DATABASES;",
            "--skip-column-names",
        ]);
        let output = self.ctx.runner.capture(&command)?;
        Ok(parse_listing(&output, SYSTEM_DATABASES))
    }

    fn backup_database(
        &self,
        profile: &ConnectionProfile,
        database: &str,
        destination: &Path,
    ) -> Result<()> {
        let command = Self::command("mysqldump", profile).args([
            "--single-transaction",
            "--routines",
            "--triggers",
            "--databases",
            database,
        ]);
        self.ctx.dump_with_retry(database, &command, destination)
    }

    fn restore_backup(
        &self,
        profile: &ConnectionProfile,
        file: &Path,
        target_database: Option<&str>,
    ) -> Result<()> {
        if let Some(target) = target_database {
            tracing::debug!(target_database = target, "mysql dumps carry their own database name; target ignored");
        }
        self.ctx
            .runner
            .restore_from_file(&Self::command("mysql", profile), file)
    }
}
