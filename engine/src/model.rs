//! Core data model for backup runs.
//!
//! This module defines the structures that flow through a backup:
//! - ConnectionProfile: where and how to reach a database server
//! - BackupResult: the raw outcome of one dump attempt
//! - BackupFileRecord / RunMetadata: the persisted catalog record of a run

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Connection details for one database server.
///
/// The password is plaintext; whoever stores profiles is responsible for
/// protecting it at rest. The engine never persists it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Unique profile name
    pub id: String,
    /// Registered engine identifier (e.g. "mysql")
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Outcome of dumping one target, as reported by an engine adapter.
#[derive(Debug)]
pub struct BackupResult {
    /// Database name, or "all" for whole-server dumps
    pub database: String,
    /// File name relative to the run directory
    pub file_name: String,
    pub outcome: Result<(), EngineError>,
}

impl BackupResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Status of a single backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
}

/// Overall status of a run, derived from its file records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every file succeeded
    Success,
    /// Some files succeeded, some failed
    Partial,
    /// No file succeeded
    Failed,
}

impl RunStatus {
    /// Derive the run status from its file records.
    ///
    /// A run without any file records has nothing that succeeded, so it is
    /// `Failed`.
    pub fn from_records(records: &[BackupFileRecord]) -> Self {
        let succeeded = records
            .iter()
            .filter(|r| r.status == FileStatus::Success)
            .count();
        if succeeded == 0 {
            RunStatus::Failed
        } else if succeeded == records.len() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Catalog entry for one produced (or attempted) backup file.
///
/// Successful records always carry a checksum and size taken from the file
/// on disk; failed records carry neither, only the error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFileRecord {
    pub name: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub size: u64,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupFileRecord {
    pub fn succeeded(name: impl Into<String>, checksum: String, size: u64) -> Self {
        BackupFileRecord {
            name: name.into(),
            checksum,
            size,
            status: FileStatus::Success,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        BackupFileRecord {
            name: name.into(),
            checksum: String::new(),
            size: 0,
            status: FileStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// The metadata record committed once per backup run (`metadata.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// `<engine>_<host>_<timestamp>`
    pub id: String,
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Fixed-width UTC timestamp, sortable as a string
    pub timestamp: String,
    pub files: Vec<BackupFileRecord>,
    pub status: RunStatus,
}

impl RunMetadata {
    /// Build the record for a finished run; the status is derived from `files`.
    pub fn new(profile: &ConnectionProfile, timestamp: &str, files: Vec<BackupFileRecord>) -> Self {
        let status = RunStatus::from_records(&files);
        RunMetadata {
            id: run_id(&profile.engine, &profile.host, timestamp),
            engine: profile.engine.clone(),
            host: profile.host.clone(),
            port: profile.port,
            user: profile.user.clone(),
            timestamp: timestamp.to_string(),
            files,
            status,
        }
    }
}

pub fn run_id(engine: &str, host: &str, timestamp: &str) -> String {
    format!("{}_{}_{}", engine, host, timestamp)
}
