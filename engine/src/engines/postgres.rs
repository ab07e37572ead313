//! PostgreSQL adapter (`psql`, `pg_dump`).
//!
//! Dumps are plain SQL with `-C`, so they recreate and reconnect to their
//! own database; restores therefore connect to the `postgres` maintenance
//! database. Template databases are excluded by the listing query itself.

use super::{parse_listing, DatabaseEngine, EngineContext, EngineRegistry};
use crate::error::Result;
use crate::model::ConnectionProfile;
use crate::pipeline::ToolCommand;
use std::path::Path;

pub const ID: &str = "postgres";

const MAINTENANCE_DB: &str = "postgres";
const LIST_QUERY: &str = "SELECT datname FROM pg_database WHERE datistemplate = false;";

pub fn register(registry: &mut EngineRegistry) {
    registry.register(ID, |ctx| Box::new(PostgresEngine::new(ctx.clone())));
}

pub struct PostgresEngine {
    ctx: EngineContext,
}

impl PostgresEngine {
    pub fn new(ctx: EngineContext) -> Self {
        PostgresEngine { ctx }
    }

    fn command(program: &str, profile: &ConnectionProfile) -> ToolCommand {
        ToolCommand::new(program)
            .args(["-h", profile.host.as_str()])
            .args(["-p".to_string(), profile.port.to_string()])
            .args(["-U", profile.user.as_str()])
            .env("PGPASSWORD", profile.password.as_str())
    }
}

impl DatabaseEngine for PostgresEngine {
    fn id(&self) -> &'static str {
        ID
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["psql", "pg_dump"]
    }

    fn list_databases(&self, profile: &ConnectionProfile) -> Result<Vec<String>> {
        let command = Self::command("psql", profile).args(["-d", MAINTENANCE_DB, "-t", "-c", LIST_QUERY]);
        let output = self.ctx.runner.capture(&command)?;
        Ok(parse_listing(&output, &[]))
    }

    fn backup_database(
        &self,
        profile: &ConnectionProfile,
        database: &str,
        destination: &Path,
    ) -> Result<()> {
        let command = Self::command("pg_dump", profile).args(["-F", "p", "-C", database]);
        self.ctx.dump_with_retry(database, &command, destination)
    }

    fn restore_backup(
        &self,
        profile: &ConnectionProfile,
        file: &Path,
        target_database: Option<&str>,
    ) -> Result<()> {
        if let Some(target) = target_database {
            tracing::debug!(target_database = target, "pg_dump -C output recreates its database; target ignored");
        }
        let command = Self::command("psql", profile).args(["-d", MAINTENANCE_DB]);
        self.ctx.runner.restore_from_file(&command, file)
    }
}
