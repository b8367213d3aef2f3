//! SHA-256 digest computation and comparison.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A lowercase hex-encoded SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    pub fn new(hex_digest: impl Into<String>) -> Self {
        Self(hex_digest.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A declared digest did not match the computed one. Always fatal.
#[derive(Debug)]
pub struct ChecksumMismatchError {
    pub path: PathBuf,
    pub expected: Checksum,
    pub actual: Checksum,
}

impl fmt::Display for ChecksumMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Checksum mismatch for {:?}: expected sha256 {}, got {}",
            self.path, self.expected, self.actual
        )
    }
}

impl std::error::Error for ChecksumMismatchError {}

/// Stream a file through SHA-256 and return its digest.
pub fn file_sha256(path: &Path) -> Result<Checksum> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {path:?} for hashing"))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to hash {path:?}"))?;
    Ok(Checksum(hex::encode(hasher.finalize())))
}

/// SHA-256 of an in-memory byte string, hex-encoded. Used for
/// content-addressing cache entries by their source URL.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare a file against its declared digest.
pub fn verify(path: &Path, expected: &Checksum) -> Result<()> {
    let actual = file_sha256(path)?;
    if actual != *expected {
        return Err(ChecksumMismatchError {
            path: path.to_path_buf(),
            expected: expected.clone(),
            actual,
        }
        .into());
    }
    Ok(())
}
