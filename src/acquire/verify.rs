//! Checksum verification
//!
//! Digests are computed over the complete downloaded buffer and compared to
//! the pinned value as lowercase hex.
//!
//! Pinned checksums are written either as bare hex (SHA-256) or with an
//! algorithm prefix:
//!
//! ```text
//! b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9
//! sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9
//! blake3:d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24
//! ```

use crate::error::{Error, Result};
use sha2::Digest;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Chunk size for reading files during hashing (1MB)
const CHUNK_SIZE: usize = 1024 * 1024;

/// Supported 256-bit hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Blake3 => "BLAKE3",
        }
    }

    /// Lowercase hex digest of `bytes`.
    pub fn digest_hex(&self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(sha2::Sha256::digest(bytes)),
            Self::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        }
    }
}

/// A pinned expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    algorithm: HashAlgorithm,
    hex: String,
}

impl Checksum {
    fn new(algorithm: HashAlgorithm, hex: &str) -> Result<Self, String> {
        let hex = hex.trim().to_lowercase();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "{} checksum must be 64 hex characters, got '{}'",
                algorithm.name(),
                hex
            ));
        }
        Ok(Self { algorithm, hex })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Expected digest, normalized to lowercase.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl FromStr for Checksum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((alg, hex)) => match alg.trim().to_lowercase().as_str() {
                "sha256" => Self::new(HashAlgorithm::Sha256, hex),
                "blake3" => Self::new(HashAlgorithm::Blake3, hex),
                other => Err(format!("unsupported checksum algorithm '{}'", other)),
            },
            None => Self::new(HashAlgorithm::Sha256, s),
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.algorithm {
            HashAlgorithm::Sha256 => write!(f, "sha256:{}", self.hex),
            HashAlgorithm::Blake3 => write!(f, "blake3:{}", self.hex),
        }
    }
}

/// Verify `bytes` against an expected digest.
///
/// On mismatch the caller must drop the bytes; nothing has been written yet.
pub fn verify(artifact: &str, bytes: &[u8], expected: &Checksum) -> Result<()> {
    let actual = expected.algorithm.digest_hex(bytes);
    if actual != expected.hex {
        return Err(Error::Integrity {
            artifact: artifact.to_string(),
            expected: expected.hex.clone(),
            actual,
        });
    }
    Ok(())
}

/// Container for computed file hashes
#[derive(Debug, Clone)]
pub struct FileHashes {
    pub sha256: String,
    pub blake3: String,
}

/// Compute all supported hashes for a file at once (for the `hash` command).
pub fn compute_hashes(file: &Path) -> Result<FileHashes> {
    let mut f = std::fs::File::open(file).map_err(|e| Error::io("cannot open file", file, e))?;
    let mut sha256_hasher = sha2::Sha256::new();
    let mut blake3_hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = f
            .read(&mut buffer)
            .map_err(|e| Error::io("read error", file, e))?;
        if n == 0 {
            break;
        }
        sha256_hasher.update(&buffer[..n]);
        blake3_hasher.update(&buffer[..n]);
    }

    Ok(FileHashes {
        sha256: hex::encode(sha256_hasher.finalize()),
        blake3: blake3_hasher.finalize().to_hex().to_string(),
    })
}
