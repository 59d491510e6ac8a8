//! Pipeline error types.

use crate::toolchain::Stage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while acquiring schemas or running the toolchain.
///
/// Every variant names the artifact or stage it came from, so the binary can
/// report the root cause without extra bookkeeping.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{artifact}: download failed: {url}: {reason}")]
    Network {
        artifact: String,
        url: String,
        reason: String,
    },

    #[error("{artifact}: integrity check failed\n  expected: {expected}\n  got:      {actual}")]
    Integrity {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("{artifact}: extraction failed: {reason}")]
    Extraction { artifact: String, reason: String },

    #[error("{context}: {path}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} stage failed (exit code: {code:?})")]
    Toolchain { stage: Stage, code: Option<i32> },

    #[error("cannot start {stage} stage: {reason}")]
    ToolchainSpawn { stage: Stage, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Locked(String),
}

impl Error {
    pub(crate) fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn extraction(artifact: &str, reason: impl Into<String>) -> Self {
        Self::Extraction {
            artifact: artifact.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the artifact this error belongs to, if any.
    pub fn artifact(&self) -> Option<&str> {
        match self {
            Self::Network { artifact, .. }
            | Self::Integrity { artifact, .. }
            | Self::Extraction { artifact, .. } => Some(artifact),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
