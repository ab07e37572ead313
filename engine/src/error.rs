//! Error types for the backup engine.
//!
//! `EngineError` covers both run-level failures (unknown engine, unusable
//! backup root, catalog commit) and per-target failures (an external tool
//! exiting non-zero, a broken compression stream). Per-target failures are
//! downgraded to failed file records by the orchestrator during a
//! multi-target run; everything else aborts the operation.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The step of a streaming pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    /// Creating the destination file
    CreateOutput,
    /// Opening the compressed source file
    OpenInput,
    /// Spawning the external program
    Start,
    /// Moving bytes between the process and the file
    Stream,
    /// Waiting for the external program to exit
    Wait,
    /// Closing the compressor (trailer bytes) and the file
    Finish,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateOutput => "create output",
            Self::OpenInput => "open input",
            Self::Start => "start",
            Self::Stream => "stream",
            Self::Wait => "wait",
            Self::Finish => "finish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// No adapter is registered under this name
    #[error("engine not found: {name}")]
    EngineNotFound { name: String },

    /// The targets of a run could not even be listed
    #[error("critical failure listing databases for {engine}: {source}")]
    CriticalEnumeration {
        engine: String,
        #[source]
        source: Box<EngineError>,
    },

    /// An external program exited unsuccessfully
    #[error("{program} exited with {}{}", exit_label(*code), output_suffix(output))]
    ToolInvocation {
        program: String,
        code: Option<i32>,
        output: String,
    },

    /// I/O failure while streaming through compression or decompression
    #[error("pipeline failed during {phase} for {}: {source}", path.display())]
    Pipeline {
        phase: PipelinePhase,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create backup directory {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write metadata {}: {source}", path.display())]
    MetadataWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read metadata {}: {source}", path.display())]
    MetadataRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse metadata {}: {source}", path.display())]
    MetadataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {} for checksum: {source}", path.display())]
    ChecksumRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid checksum value: {value}")]
    InvalidChecksum { value: String },
}

impl EngineError {
    /// True for failures scoped to a single dump or restore target.
    ///
    /// These are recorded as a failed file record when they happen inside a
    /// multi-target run instead of aborting the run.
    pub fn is_target_failure(&self) -> bool {
        matches!(self, Self::ToolInvocation { .. } | Self::Pipeline { .. })
    }

    pub(crate) fn pipeline(phase: PipelinePhase, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Pipeline {
            phase,
            path: path.into(),
            source,
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

fn output_suffix(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(", output: {}", trimmed)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
