//! Artifact fetcher: download then verify, nothing persisted.

use super::http::Transport;
use super::verify;
use crate::config::ArtifactSpec;
use crate::core::output;
use crate::error::{Error, Result};

/// Downloads pinned artifacts and gates them on their checksum.
pub struct ArtifactFetcher<'a> {
    transport: &'a dyn Transport,
}

impl<'a> ArtifactFetcher<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Fetch the outer bundle for `spec` and verify it.
    ///
    /// The returned bytes have matched `spec.checksum`. On any failure the
    /// body is dropped here and never reaches the extractor.
    pub fn fetch(&self, spec: &ArtifactSpec) -> Result<Vec<u8>> {
        let url = spec.url();
        output::detail(&format!("downloading {}", url));

        let bytes = self.transport.get(&url).map_err(|e| Error::Network {
            artifact: spec.name.clone(),
            url: url.clone(),
            reason: e.to_string(),
        })?;
        output::detail(&format!("downloaded {} ({} bytes)", spec.file_name(), bytes.len()));

        verify::verify(&spec.name, &bytes, &spec.checksum)?;
        tracing::debug!(artifact = %spec.name, checksum = %spec.checksum, "checksum verified");

        Ok(bytes)
    }
}
