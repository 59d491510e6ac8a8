//! Pinned, checksum-gated acquisition of DMTF Redfish and SNIA Swordfish
//! CSDL schema bundles.
//!
//! A run downloads each configured bundle, verifies it against its pinned
//! digest, extracts the selected schema files into a flat directory and
//! records a completion marker. Later runs skip artifacts whose marker is
//! present. Once every artifact is ready the consuming project is built,
//! tested, linted and documented by an external toolchain.
//!
//! # Layout
//!
//! ```text
//! <project>/
//! ├── schemas.toml          # optional artifact table
//! ├── schemas.lock          # locked while a run or clean is active
//! └── schemas/
//!     ├── .root.done
//!     ├── .redfish@2025.2-<digest prefix>.done
//!     ├── .swordfish@v1.2.8-<digest prefix>.done
//!     ├── redfish-csdl/*.xml
//!     └── swordfish-csdl/*.xml
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [[artifact]]
//! name = "redfish"
//! version = "2025.2"
//! url = "https://www.dmtf.org/sites/default/files/standards/documents/DSP8010_{version}.zip"
//! checksum = "sha256:<hex>"
//! select = ["csdl/*"]
//! destination = "redfish-csdl"
//! ```
//!
//! Without a `schemas.toml` the built-in table for both bundles is used. It
//! ships without digests, so loading it fails with a config error naming the
//! artifact until a checksum is pinned.
//!
//! # Example
//!
//! ```no_run
//! use schema_acquire::{Config, Orchestrator};
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("."), None)?;
//! let report = Orchestrator::from_config(config).acquire()?;
//! for (name, outcome) in &report.artifacts {
//!     println!("{name}: {outcome:?}");
//! }
//! # Ok::<(), schema_acquire::Error>(())
//! ```

pub mod acquire;
pub mod clean;
pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod marker;
pub mod pipeline;
pub mod toolchain;

pub use acquire::{ArtifactFetcher, Checksum, HttpTransport, Transport, TransportError};
pub use clean::clean;
pub use config::{ArtifactLayout, ArtifactSpec, Config};
pub use crate::core::output;
pub use error::{Error, Result};
pub use extract::{ArchiveFormat, Selector};
pub use marker::{FsMarkerStore, MarkerId, MarkerStore};
pub use pipeline::{ArtifactOutcome, Orchestrator, PipelineState, RunReport};
pub use toolchain::{CargoToolchain, Stage, Toolchain, ToolchainConfig};
