//! dbmigrate - Command-line interface for the backup engine.
//!
//! Backs up configured database sources into the on-disk catalog, lists and
//! verifies recorded runs, and restores backup files into a target source.
//! Results go to stdout, progress and logs to stderr.
//!
//! Exit codes: 0 success, 1 partial backup, 2 failed run or error.

mod config;
mod logger;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use config::CliConfig;
use dbmigrate_engine::{
    program_on_path, BackupFileRecord, FileStatus, Orchestrator, ProgressCallback, RunMetadata,
    RunStatus, VerifyOutcome,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// dbmigrate - Back up and restore MySQL, PostgreSQL and MongoDB servers
#[derive(Parser, Debug)]
#[command(name = "dbmigrate")]
#[command(version)]
#[command(about = "Back up and restore database servers with a checksummed catalog")]
struct Cli {
    /// Configuration file (default: $DBMIGRATE_CONFIG or ./dbmigrate.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the catalog root from the configuration
    #[arg(long, global = true, value_name = "PATH")]
    backup_root: Option<PathBuf>,

    /// Override the log level from the configuration
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered engines and whether their tools are installed
    Engines,

    /// List configured sources
    Sources,

    /// Back up one database, or every database of a source
    Backup {
        /// Source id from the configuration
        #[arg(long, value_name = "ID")]
        source: String,

        /// Single database to back up
        #[arg(long, value_name = "NAME")]
        db: Option<String>,
    },

    /// List recorded runs, newest first
    List {
        #[arg(long, value_name = "ENGINE")]
        engine: Option<String>,

        #[arg(long, value_name = "HOST")]
        host: Option<String>,
    },

    /// Restore a backup file into a configured source
    Restore {
        /// Compressed backup file
        #[arg(long, value_name = "PATH")]
        backup: PathBuf,

        /// Source id to restore into
        #[arg(long, value_name = "ID")]
        target: String,

        /// Target database name (ignored by dumps that create their own)
        #[arg(long, value_name = "NAME")]
        db: Option<String>,
    },

    /// Recompute and compare the checksums of a recorded run
    Verify {
        /// Run id as shown by `list`
        #[arg(long, value_name = "ID")]
        run: String,
    },
}

/// CLI implementation of ProgressCallback for displaying backup progress
struct CliProgress {
    start_time: Instant,
}

impl CliProgress {
    fn new() -> Self {
        CliProgress {
            start_time: Instant::now(),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_run_started(&self, engine: &str, host: &str, run_dir: &Path) {
        eprintln!("Starting {} backup of {}", engine, host);
        eprintln!("  Directory: {}", run_dir.display());
        eprintln!();
    }

    fn on_target_completed(&self, database: &str, record: &BackupFileRecord) {
        match record.status {
            FileStatus::Success => {
                eprintln!("[OK] {} ({})", database, Self::format_bytes(record.size))
            }
            FileStatus::Failed => eprintln!(
                "[FAILED] {}: {}",
                database,
                record.error.as_deref().unwrap_or("(unknown error)")
            ),
        }
    }

    fn on_run_completed(&self, metadata: &RunMetadata) {
        let done = metadata
            .files
            .iter()
            .filter(|f| f.status == FileStatus::Success)
            .count();
        let total_bytes: u64 = metadata.files.iter().map(|f| f.size).sum();

        eprintln!();
        eprintln!("Backup {}: {}", metadata.status, metadata.id);
        eprintln!(
            "Summary: {} done, {} failed",
            done,
            metadata.files.len() - done
        );
        eprintln!("Bytes written: {}", Self::format_bytes(total_bytes));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Success => 0,
        RunStatus::Partial => 1,
        RunStatus::Failed => 2,
    }
}

/// Load the configuration file and apply command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<CliConfig> {
    let path = CliConfig::resolve_path(cli.config.as_deref());
    let mut config = CliConfig::load(&path)?;

    if let Some(root) = &cli.backup_root {
        config.engine.backup_root = root.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    Ok(config)
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = logger::init(&config.log.level) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let orchestrator = Orchestrator::from_settings(&config.engine);
    let stdout = std::io::stdout();

    let exit_code = match run_cli(&cli, &config, &orchestrator, &mut stdout.lock()) {
        Ok(status) => exit_code(status),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "command failed");
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(
    cli: &Cli,
    config: &CliConfig,
    orchestrator: &Orchestrator,
    out: &mut dyn Write,
) -> anyhow::Result<RunStatus> {
    match &cli.command {
        Command::Engines => {
            let registry = orchestrator.registry();
            for name in registry.list_registered() {
                let engine = registry.resolve(name)?;
                let tools: Vec<String> = engine
                    .required_tools()
                    .iter()
                    .map(|tool| {
                        let state = if program_on_path(tool) { "ok" } else { "missing" };
                        format!("{}: {}", tool, state)
                    })
                    .collect();
                writeln!(out, "{:<10} {}", name, tools.join(", "))?;
            }
            Ok(RunStatus::Success)
        }

        Command::Sources => {
            if config.sources.is_empty() {
                writeln!(out, "No sources configured")?;
            }
            for source in &config.sources {
                writeln!(
                    out,
                    "{:<16} {:<10} {}@{}:{}",
                    source.id, source.engine, source.user, source.host, source.port
                )?;
            }
            Ok(RunStatus::Success)
        }

        Command::Backup { source, db } => {
            let profile = config.source(source)?.to_profile()?;
            let progress = CliProgress::new();
            let metadata = orchestrator
                .run_backup(profile, db.as_deref(), Some(&progress))
                .with_context(|| format!("backup of source '{}' failed", source))?;

            writeln!(out, "{} {}", metadata.id, metadata.status)?;
            Ok(metadata.status)
        }

        Command::List { engine, host } => {
            let entries = orchestrator
                .catalog()
                .list_filtered(engine.as_deref(), host.as_deref())?;
            if entries.is_empty() {
                writeln!(out, "No backups found in {}", orchestrator.catalog().root().display())?;
            }
            for entry in entries {
                let meta = &entry.metadata;
                let done = meta
                    .files
                    .iter()
                    .filter(|f| f.status == FileStatus::Success)
                    .count();
                writeln!(
                    out,
                    "{}  {:<8} {}/{} files  {}",
                    meta.id,
                    meta.status.to_string(),
                    done,
                    meta.files.len(),
                    entry.dir.display()
                )?;
            }
            Ok(RunStatus::Success)
        }

        Command::Restore { backup, target, db } => {
            let profile = config.source(target)?.to_profile()?;
            orchestrator
                .run_restore(profile, backup, db.as_deref())
                .with_context(|| format!("restore of {} failed", backup.display()))?;

            writeln!(out, "Restored {} into '{}'", backup.display(), target)?;
            Ok(RunStatus::Success)
        }

        Command::Verify { run } => {
            let entry = match orchestrator.catalog().find_run(run)? {
                Some(entry) => entry,
                None => bail!("no recorded run with id '{}'", run),
            };

            let mut healthy = true;
            for file in orchestrator.catalog().verify(&entry) {
                let line = match &file.outcome {
                    VerifyOutcome::Verified => format!("[OK] {}", file.name),
                    VerifyOutcome::Skipped => format!("[SKIPPED] {} (failed during backup)", file.name),
                    VerifyOutcome::Mismatch => {
                        healthy = false;
                        format!("[MISMATCH] {}", file.name)
                    }
                    VerifyOutcome::Missing => {
                        healthy = false;
                        format!("[MISSING] {}", file.name)
                    }
                    VerifyOutcome::Error(msg) => {
                        healthy = false;
                        format!("[ERROR] {}: {}", file.name, msg)
                    }
                };
                writeln!(out, "{}", line)?;
            }

            Ok(if healthy { RunStatus::Success } else { RunStatus::Failed })
        }
    }
}
