//! Engine settings.
//!
//! Every field has a default so a partial (or absent) configuration section
//! deserializes cleanly.

use crate::checksums::ChecksumAlgorithm;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Root of the on-disk catalog
    pub backup_root: PathBuf,

    /// Retry policy for dump operations
    pub retry: RetryPolicy,

    /// Algorithm used for new file records
    pub checksum: ChecksumAlgorithm,

    /// gzip level (0-9)
    pub compression_level: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            backup_root: PathBuf::from("backups"),
            retry: RetryPolicy::default(),
            checksum: ChecksumAlgorithm::default(),
            compression_level: 6,
        }
    }
}
