//! Shared fixtures for pipeline integration tests: in-memory bundles, a
//! counting transport and a recording toolchain.

#![allow(dead_code)]

use schema_acquire::acquire::HashAlgorithm;
use schema_acquire::{
    Config, Error, FsMarkerStore, MarkerId, MarkerStore, Orchestrator, Result, Stage, Toolchain,
    Transport, TransportError,
};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const REDFISH_URL: &str = "https://mirror.test/redfish/DSP8010_2025.2.zip";
pub const REDFISH_NEXT_URL: &str = "https://mirror.test/redfish/DSP8010_2026.1.zip";
pub const SWORDFISH_URL: &str = "https://mirror.test/swordfish/v1.2.8/Swordfish_v1.2.8.zip";

/// Build a zip archive in memory. Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

pub fn redfish_bundle() -> Vec<u8> {
    zip_bytes(&[
        ("csdl/", b""),
        ("csdl/Resource_v1.xml", b"<Schema Namespace=\"Resource.v1_0_0\"/>"),
        ("csdl/ServiceRoot_v1.xml", b"<Schema Namespace=\"ServiceRoot.v1_0_0\"/>"),
        ("json-schema/ServiceRoot.v1_0_0.json", b"{}"),
        ("README.md", b"DSP8010"),
    ])
}

/// A later redfish release that adds `Resource_v2.xml`.
pub fn redfish_bundle_next() -> Vec<u8> {
    zip_bytes(&[
        ("csdl/Resource_v1.xml", b"<Schema Namespace=\"Resource.v1_1_0\"/>"),
        ("csdl/Resource_v2.xml", b"<Schema Namespace=\"Resource.v2_0_0\"/>"),
        ("csdl/ServiceRoot_v1.xml", b"<Schema Namespace=\"ServiceRoot.v1_1_0\"/>"),
    ])
}

pub fn swordfish_inner() -> Vec<u8> {
    zip_bytes(&[
        ("csdl-schema/Volume_v1.xml", b"<Schema Namespace=\"Volume.v1_0_0\"/>"),
        ("csdl-schema/StoragePool_v1.xml", b"<Schema Namespace=\"StoragePool.v1_0_0\"/>"),
        ("json-schema/Volume.v1_0_0.json", b"{}"),
    ])
}

pub fn swordfish_bundle() -> Vec<u8> {
    let inner = swordfish_inner();
    zip_bytes(&[
        ("Swordfish_v1.2.8/Swordfish_v1.2.8_Schema.zip", inner.as_slice()),
        ("Swordfish_v1.2.8/Swordfish_v1.2.8_Specification.pdf", b"%PDF"),
    ])
}

pub fn sha256(bytes: &[u8]) -> String {
    HashAlgorithm::Sha256.digest_hex(bytes)
}

/// Artifact table pinning the given bundles.
pub fn config_toml(redfish: &[u8], swordfish: &[u8]) -> String {
    config_toml_at("2025.2", redfish, swordfish)
}

/// Artifact table with a chosen redfish version.
pub fn config_toml_at(redfish_version: &str, redfish: &[u8], swordfish: &[u8]) -> String {
    format!(
        r#"
[[artifact]]
name = "redfish"
version = "{}"
url = "https://mirror.test/redfish/DSP8010_{{version}}.zip"
checksum = "{}"
select = ["csdl/*.xml"]
destination = "redfish-csdl"

[[artifact]]
name = "swordfish"
version = "v1.2.8"
url = "https://mirror.test/swordfish/{{version}}/Swordfish_{{version}}.zip"
checksum = "sha256:{}"
nested = "Swordfish_{{version}}_Schema.zip"
select = ["csdl-schema/*.xml"]
destination = "swordfish-csdl"
"#,
        redfish_version,
        sha256(redfish),
        sha256(swordfish)
    )
}

/// Serves fixed bodies by URL and counts every request.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    bodies: HashMap<String, Vec<u8>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    /// Both pinned bundles.
    pub fn upstream() -> Self {
        Self::new()
            .serve(REDFISH_URL, redfish_bundle())
            .serve(SWORDFISH_URL, swordfish_bundle())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or(TransportError::Status(404))
    }
}

/// Records stages and optionally fails one.
#[derive(Clone, Default)]
pub struct RecordingToolchain {
    pub stages: Arc<Mutex<Vec<Stage>>>,
    fail_at: Option<Stage>,
}

impl RecordingToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.stages.lock().unwrap().clone()
    }
}

impl Toolchain for RecordingToolchain {
    fn run(&self, stage: Stage) -> Result<()> {
        self.stages.lock().unwrap().push(stage);
        if self.fail_at == Some(stage) {
            return Err(Error::Toolchain {
                stage,
                code: Some(101),
            });
        }
        Ok(())
    }
}

/// A project directory with a `schemas.toml`.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new(config_toml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schemas.toml"), config_toml).unwrap();
        Self { dir }
    }

    /// Project pinning the standard fixture bundles.
    pub fn upstream() -> Self {
        Self::new(&config_toml(&redfish_bundle(), &swordfish_bundle()))
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn work_dir(&self) -> std::path::PathBuf {
        self.root().join("schemas")
    }

    pub fn config(&self) -> Config {
        Config::load(self.root(), None).unwrap()
    }

    pub fn orchestrator(
        &self,
        transport: &MemoryTransport,
        toolchain: &RecordingToolchain,
    ) -> Orchestrator {
        self.orchestrator_with(self.config(), transport, toolchain)
    }

    pub fn orchestrator_with(
        &self,
        config: Config,
        transport: &MemoryTransport,
        toolchain: &RecordingToolchain,
    ) -> Orchestrator {
        let markers = FsMarkerStore::new(&config.work_dir);
        Orchestrator::new(
            config,
            Box::new(transport.clone()),
            Box::new(markers),
            Box::new(toolchain.clone()),
        )
    }

    /// Replace `schemas.toml`.
    pub fn rewrite_config(&self, config_toml: &str) {
        std::fs::write(self.root().join("schemas.toml"), config_toml).unwrap();
    }

    /// Marker for `root` or for the named artifact as currently pinned.
    pub fn marker_id(&self, name: &str) -> MarkerId {
        if name == "root" {
            return MarkerId::Root;
        }
        MarkerId::artifact(self.config().artifact(name).unwrap())
    }

    pub fn marker(&self, name: &str) -> bool {
        FsMarkerStore::new(self.work_dir()).exists(&self.marker_id(name))
    }

    /// Marker file names present in the work directory.
    pub fn marker_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.work_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".done"))
            .collect();
        names.sort();
        names
    }

    /// Every file under the work directory except markers, by relative path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect(&self.work_dir(), &self.work_dir(), &mut files);
        files
    }
}

fn collect(base: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(base, &path, files);
        } else if !path.to_string_lossy().ends_with(".done") {
            let rel = path.strip_prefix(base).unwrap().to_string_lossy().into_owned();
            files.insert(rel, std::fs::read(&path).unwrap());
        }
    }
}
