//! On-disk catalog of backup runs.
//!
//! Layout: `<root>/<engine>/source-<host>_<timestamp>/`, holding the dumped
//! files and one `metadata.json`. Listing scans that two-level hierarchy and
//! silently skips run directories whose record is missing or unreadable,
//! which also covers runs still in progress.

use crate::checksums;
use crate::error::{EngineError, Result};
use crate::model::{FileStatus, RunMetadata};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "metadata.json";

/// Fixed-width, zero-padded and filesystem-safe; sorts chronologically as a string.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// A freshly created, not yet committed run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    pub path: PathBuf,
    pub timestamp: String,
}

/// A committed run together with the directory it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub dir: PathBuf,
    pub metadata: RunMetadata,
}

/// Result of re-checking one file of a committed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Checksum recomputed and equal to the record
    Verified,
    /// File present but its bytes changed
    Mismatch,
    /// File recorded as successful but absent
    Missing,
    /// Record was a failed attempt; nothing to check
    Skipped,
    /// Checksum could not be computed or the record is malformed
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVerification {
    pub name: String,
    pub outcome: VerifyOutcome,
}

#[derive(Debug, Clone)]
pub struct BackupCatalog {
    root: PathBuf,
}

impl BackupCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BackupCatalog { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `<root>/<engine>/source-<host>_<timestamp>/`.
    ///
    /// The run directory itself must not exist yet: two runs never share a
    /// directory.
    pub fn create_run_dir(&self, engine: &str, host: &str, at: DateTime<Utc>) -> Result<RunDir> {
        let timestamp = format_timestamp(at);
        let engine_dir = self.root.join(engine);
        let path = engine_dir.join(format!("source-{}_{}", sanitize_component(host), timestamp));

        fs::create_dir_all(&engine_dir).map_err(|source| EngineError::DirectoryCreate {
            path: engine_dir.clone(),
            source,
        })?;
        fs::create_dir(&path).map_err(|source| EngineError::DirectoryCreate {
            path: path.clone(),
            source,
        })?;

        Ok(RunDir { path, timestamp })
    }

    /// Write the run's metadata record. A record is written once and never
    /// replaced; the rename makes it appear atomically to concurrent listings.
    pub fn commit(&self, run: &RunDir, metadata: &RunMetadata) -> Result<PathBuf> {
        let target = run.path.join(METADATA_FILE);
        let write_error = |source| EngineError::MetadataWrite {
            path: target.clone(),
            source,
        };

        if target.exists() {
            return Err(write_error(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "run already has a committed metadata record",
            )));
        }

        let data = serde_json::to_vec_pretty(metadata)
            .map_err(|e| write_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let staging = run.path.join(format!("{}.tmp", METADATA_FILE));
        let mut file = fs::File::create(&staging).map_err(write_error)?;
        file.write_all(&data).map_err(write_error)?;
        file.sync_all().map_err(write_error)?;
        drop(file);
        fs::rename(&staging, &target).map_err(write_error)?;

        tracing::info!(run = %metadata.id, status = %metadata.status, path = %target.display(), "run committed");
        Ok(target)
    }

    /// Read one metadata record.
    pub fn load(path: &Path) -> Result<RunMetadata> {
        let data = fs::read(path).map_err(|source| EngineError::MetadataRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| EngineError::MetadataParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every committed run with its directory, newest first.
    ///
    /// A missing root is an empty catalog. Unreadable engine directories and
    /// run directories without a valid record are skipped.
    pub fn list_entries(&self) -> Result<Vec<CatalogEntry>> {
        let engines = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EngineError::MetadataRead {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut found = Vec::new();
        for engine_dir in engines.filter_map(|e| e.ok()) {
            if !engine_dir.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Ok(runs) = fs::read_dir(engine_dir.path()) else {
                continue;
            };
            for run_dir in runs.filter_map(|e| e.ok()) {
                if !run_dir.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let dir = run_dir.path();
                match Self::load(&dir.join(METADATA_FILE)) {
                    Ok(metadata) => found.push(CatalogEntry { dir, metadata }),
                    Err(e) => tracing::debug!(dir = %dir.display(), error = %e, "skipping run without valid metadata"),
                }
            }
        }

        found.sort_by(|a, b| {
            b.metadata
                .timestamp
                .cmp(&a.metadata.timestamp)
                .then_with(|| b.metadata.id.cmp(&a.metadata.id))
        });
        Ok(found)
    }

    /// Every committed run record, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunMetadata>> {
        Ok(self.list_entries()?.into_iter().map(|e| e.metadata).collect())
    }

    /// Runs restricted to an engine and/or host, newest first.
    pub fn list_filtered(&self, engine: Option<&str>, host: Option<&str>) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .list_entries()?
            .into_iter()
            .filter(|e| engine.map_or(true, |want| e.metadata.engine == want))
            .filter(|e| host.map_or(true, |want| e.metadata.host == want))
            .collect())
    }

    pub fn find_run(&self, id: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.list_entries()?.into_iter().find(|e| e.metadata.id == id))
    }

    /// Recompute the checksum of every successful file of a run.
    pub fn verify(&self, entry: &CatalogEntry) -> Vec<FileVerification> {
        entry
            .metadata
            .files
            .iter()
            .map(|record| {
                let outcome = if record.status == FileStatus::Failed {
                    VerifyOutcome::Skipped
                } else {
                    let path = entry.dir.join(&record.name);
                    if !path.is_file() {
                        VerifyOutcome::Missing
                    } else {
                        match checksums::verify_file(&path, &record.checksum) {
                            Ok(true) => VerifyOutcome::Verified,
                            Ok(false) => VerifyOutcome::Mismatch,
                            Err(e) => VerifyOutcome::Error(e.to_string()),
                        }
                    }
                };
                FileVerification {
                    name: record.name.clone(),
                    outcome,
                }
            })
            .collect()
    }
}

/// Make a host or database name usable as a single path component.
///
/// Path separators and anything else outside `[A-Za-z0-9._-]` become `-`,
/// so the result can never leave the directory it is joined onto.
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
