//! Content comparison by chunked checksum.
//!
//! This module provides:
//! - Checksum algorithms (MD5, SHA-256, BLAKE3)
//! - File checksums computed in fixed 8 KiB chunks
//! - The same/different verdict used by the mirror engine
//!
//! A digest collision would make two different files compare as the same.
//! The digests are used for change detection only, never for integrity
//! against tampering.

use crate::error::EngineError;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Size of each chunk fed into the running digest.
pub const CHUNK_SIZE: usize = 8192;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// MD5 (fast enough, collision-prone; fine for change detection)
    #[default]
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
                other
            )),
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

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lowercase hex digest
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

/// Result of comparing a source file with its backup copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Same,
    Different,
}

/// Running digest over a stream of chunks.
pub trait ChecksumHasher {
    fn update(&mut self, data: &[u8]);

    fn finalize(self: Box<Self>) -> ChecksumValue;
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

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Compute the checksum of a file.
///
/// The size is read from the open file's metadata and the content is consumed
/// in chunks of exactly `CHUNK_SIZE` bytes, the last one holding the
/// remainder. A file that shrinks while being read yields a `ReadError`.
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, EngineError> {
    let read_error = |source: io::Error| EngineError::ReadError {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let size = file.metadata().map_err(read_error)?.len();

    let mut hasher = create_hasher(algorithm);
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut remaining = size;

    while remaining > 0 {
        let chunk = remaining.min(CHUNK_SIZE as u64) as usize;
        file.read_exact(&mut buffer[..chunk]).map_err(read_error)?;
        hasher.update(&buffer[..chunk]);
        remaining -= chunk as u64;
    }

    Ok(hasher.finalize())
}

/// Compare a source file with its backup copy by content.
///
/// Files of different length are reported `Different` without hashing.
/// Otherwise both files are hashed independently and the digests compared.
pub fn compare_files(
    source: &Path,
    backup: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<Verdict, EngineError> {
    let source_len = std::fs::metadata(source)
        .map_err(|e| EngineError::ReadError {
            path: source.to_path_buf(),
            source: e,
        })?
        .len();
    let backup_len = std::fs::metadata(backup)
        .map_err(|e| EngineError::ReadError {
            path: backup.to_path_buf(),
            source: e,
        })?
        .len();

    if source_len != backup_len {
        return Ok(Verdict::Different);
    }

    let source_checksum = compute_file_checksum(source, algorithm)?;
    let backup_checksum = compute_file_checksum(backup, algorithm)?;

    if source_checksum.hex() == backup_checksum.hex() {
        Ok(Verdict::Same)
    } else {
        Ok(Verdict::Different)
    }
}
