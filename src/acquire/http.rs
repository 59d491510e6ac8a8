//! HTTP transport for artifact downloads
//!
//! A single GET per call, no retries. Redirects are followed by `ureq`;
//! any final status outside 2xx is a failure.

use crate::core::output::{self, ProgressGuard};
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

/// Why a transport call failed. The fetcher attaches the artifact name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),
    /// Host unreachable, TLS failure, timeout, or body read failure.
    #[error("{0}")]
    Transport(String),
}

/// Source of artifact bytes.
///
/// Implementations must be shareable across threads so artifacts can be
/// acquired concurrently.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// `ureq`-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    show_progress: bool,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("schema-acquire/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            show_progress: true,
        }
    }

    /// Disable the progress bar (tests, parallel runs).
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        tracing::debug!(%url, "GET");

        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => TransportError::Status(code),
            ureq::Error::Transport(t) => TransportError::Transport(t.to_string()),
        })?;

        // ureq follows redirects and errors on 4xx/5xx; guard the rest of the non-2xx range.
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(TransportError::Status(status));
        }

        let content_length: Option<u64> = response
            .header("content-length")
            .and_then(|s| s.parse().ok());

        let pb = if self.show_progress {
            output::spinner(&format!("downloading {}", url))
        } else {
            indicatif::ProgressBar::hidden()
        };
        let _guard = ProgressGuard::new(&pb);
        if let Some(len) = content_length {
            output::upgrade_to_bytes(&pb, len);
        }

        let mut reader = response.into_reader();
        let mut body = Vec::with_capacity(content_length.unwrap_or(0).min(64 << 20) as usize);
        let mut buffer = [0u8; 8192];

        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|e| TransportError::Transport(format!("read error: {}", e)))?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buffer[..n]);
            pb.set_position(body.len() as u64);
        }

        tracing::debug!(%url, bytes = body.len(), "download complete");
        Ok(body)
    }
}
