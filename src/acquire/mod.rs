//! Acquisition: download pinned bundles and gate them on their checksum.
//!
//! - **http**: `Transport` trait and the `ureq` implementation
//! - **verify**: SHA-256 / BLAKE3 checksum verification
//! - **fetch**: `ArtifactFetcher`, download + verify for one `ArtifactSpec`

pub mod fetch;
pub mod http;
pub mod verify;

pub use fetch::ArtifactFetcher;
pub use http::{HttpTransport, Transport, TransportError};
pub use verify::{Checksum, FileHashes, HashAlgorithm, compute_hashes, verify};
