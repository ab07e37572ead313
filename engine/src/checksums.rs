//! Checksum computation and verification for finished backup files.
//!
//! Checksums are stored in the catalog as algorithm-prefixed hex strings
//! (`sha256:<hex>`), so a record can be re-verified later even if the
//! configured default algorithm has changed since.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// SHA-256 (cryptographic, 256-bit)
    #[default]
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
    /// MD5 (compatibility only)
    Md5,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
            Self::Md5 => write!(f, "md5"),
        }
    }
}

impl ChecksumAlgorithm {
    /// Parse algorithm from its lowercase name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "blake3" => Some(Self::Blake3),
            "md5" => Some(Self::Md5),
            _ => None,
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    /// Parse an `algo:hex` string as stored in the catalog.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || EngineError::InvalidChecksum {
            value: value.to_string(),
        };
        let (algo, hex) = value.split_once(':').ok_or_else(invalid)?;
        let algorithm = ChecksumAlgorithm::parse(algo).ok_or_else(invalid)?;
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        Ok(ChecksumValue::new(algorithm, hex.to_lowercase()))
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

/// Formats as "algo:hex"
impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Incremental hasher over a byte stream
trait ChecksumHasher {
    fn update(&mut self, data: &[u8]);

    fn finalize(self: Box<Self>) -> ChecksumValue;
}

struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Blake3, digest.to_hex().to_string())
    }
}

struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.context.compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
    }
}

/// Stream a file once through the hasher for `algorithm`.
pub fn compute_file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<ChecksumValue> {
    let read_error = |source| EngineError::ChecksumRead {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = create_hasher(algorithm);
    let mut buffer = [0u8; 65536]; // 64 KB buffer

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        }
    }

    Ok(hasher.finalize())
}

/// Compute the catalog form (`algo:hex`) of a file's checksum.
pub fn digest(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    compute_file_checksum(path, algorithm).map(|value| value.to_string())
}

/// Recompute a file's checksum with the algorithm named in `expected` and
/// compare. Returns Ok(false) on mismatch.
pub fn verify_file(path: &Path, expected: &str) -> Result<bool> {
    let expected = ChecksumValue::parse(expected)?;
    let actual = compute_file_checksum(path, expected.algorithm())?;
    Ok(actual == expected)
}
