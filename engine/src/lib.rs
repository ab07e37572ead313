//! # dbmigrate Engine - Database Backup Library
//!
//! A headless backup and restore engine for MySQL, PostgreSQL and MongoDB
//! servers, driving each vendor's command-line tools. Designed as the
//! foundation for multiple front ends (CLI, schedulers, automation).
//!
//! ## Overview
//!
//! The engine provides:
//! - Pluggable engine adapters resolved by name through a registry
//! - Streaming gzip pipelines between dump/restore tools and files
//! - Per-target failure isolation with bounded retries for dumps
//! - Checksummed, write-once run records in an on-disk catalog
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use dbmigrate_engine::{ConnectionProfile, EngineSettings, Orchestrator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::from_settings(&EngineSettings::default());
//!
//! let profile = ConnectionProfile {
//!     id: "prod".to_string(),
//!     engine: "postgres".to_string(),
//!     host: "db1.internal".to_string(),
//!     port: 5432,
//!     user: "backup".to_string(),
//!     password: std::env::var("PGPASSWORD")?,
//! };
//!
//! // Back up every database on the server
//! let metadata = orchestrator.run_backup(profile, None, None)?;
//! println!("{}: {}", metadata.id, metadata.status);
//! for file in &metadata.files {
//!     println!("{} {:?} {}", file.name, file.status, file.checksum);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Connection profiles, dump results, run records
//! - **error**: Error types and handling
//! - **pipeline**: External tool invocation and gzip streaming
//! - **retry**: Retry policy for dumps
//! - **engines**: Engine adapters and the registry
//! - **catalog**: On-disk layout, commit, listing and verification of runs
//! - **orchestrator**: Backup and restore workflows
//! - **progress**: Progress callback trait
//! - **checksums**: Checksum computation and verification
//! - **config**: Engine settings

pub mod catalog;
pub mod checksums;
pub mod config;
pub mod engines;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod retry;

// Re-export main types and functions
pub use catalog::{BackupCatalog, CatalogEntry, FileVerification, RunDir, VerifyOutcome};
pub use checksums::{compute_file_checksum, digest, verify_file, ChecksumAlgorithm, ChecksumValue};
pub use config::EngineSettings;
pub use engines::{DatabaseEngine, EngineContext, EngineRegistry};
pub use error::{EngineError, PipelinePhase};
pub use model::{BackupFileRecord, BackupResult, ConnectionProfile, FileStatus, RunMetadata, RunStatus};
pub use orchestrator::Orchestrator;
pub use pipeline::{program_on_path, SystemRunner, ToolCommand, ToolRunner};
pub use progress::ProgressCallback;
pub use retry::RetryPolicy;
