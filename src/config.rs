//! Pipeline configuration
//!
//! The artifact table is data: a list of records with recognised fields,
//! read from `schemas.toml` in the project root when present and otherwise
//! taken from the built-in pins for the Redfish and Swordfish bundles.

use crate::acquire::verify::Checksum;
use crate::error::{Error, Result};
use crate::extract::Selector;
use crate::toolchain::ToolchainConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Name of the optional configuration file in the project root.
pub const CONFIG_FILE: &str = "schemas.toml";

/// Placeholder substituted with the artifact version.
pub const VERSION_PLACEHOLDER: &str = "{version}";

const DEFAULT_WORK_DIR: &str = "schemas";
const DEFAULT_TARGET_DIR: &str = "target";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;
const HTTP_TIMEOUT_ENV: &str = "SCHEMA_HTTP_TIMEOUT";

pub const REDFISH_VERSION: &str = "2025.2";
pub const REDFISH_URL: &str =
    "https://www.dmtf.org/sites/default/files/standards/documents/DSP8010_{version}.zip";
/// Pinned digest of the built-in Redfish bundle. `None` until a digest has
/// been recorded with `schema-acquire hash`; loading the built-in table fails
/// until then.
pub const REDFISH_SHA256: Option<&str> = None;

pub const SWORDFISH_VERSION: &str = "v1.2.8";
pub const SWORDFISH_URL: &str = "https://www.snia.org/sites/default/files/technical-work/swordfish/release/{version}/zip/Swordfish_{version}.zip";
/// Pinned digest of the built-in Swordfish release zip. See [`REDFISH_SHA256`].
pub const SWORDFISH_SHA256: Option<&str> = None;
pub const SWORDFISH_NESTED: &str = "Swordfish_{version}_Schema.zip";

/// How the selected files sit inside the downloaded bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLayout {
    /// Selector applies to the downloaded archive directly.
    Plain,
    /// The download contains exactly one entry named `entry` (may contain
    /// `{version}`) which is itself an archive; the selector applies to it.
    Nested { entry: String },
}

/// A pinned, immutable description of one schema bundle.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub name: String,
    pub version: String,
    pub url_template: String,
    pub checksum: Checksum,
    pub selector: Selector,
    pub layout: ArtifactLayout,
    /// Destination directory, relative to the work directory.
    pub destination: PathBuf,
}

impl ArtifactSpec {
    /// Download URL with the version substituted.
    pub fn url(&self) -> String {
        self.url_template.replace(VERSION_PLACEHOLDER, &self.version)
    }

    /// Inner archive name for nested bundles, with the version substituted.
    pub fn nested_entry(&self) -> Option<String> {
        match &self.layout {
            ArtifactLayout::Plain => None,
            ArtifactLayout::Nested { entry } => {
                Some(entry.replace(VERSION_PLACEHOLDER, &self.version))
            }
        }
    }

    /// File name of the download, used to detect the archive format.
    pub fn file_name(&self) -> String {
        let url = self.url();
        let path = url.split(['?', '#']).next().unwrap_or(&url);
        path.rsplit('/').next().unwrap_or(path).to_string()
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: PathBuf,
    pub work_dir: PathBuf,
    pub target_dir: PathBuf,
    pub parallel: bool,
    pub http_timeout: Duration,
    pub toolchain: ToolchainConfig,
    pub artifacts: Vec<ArtifactSpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    work_dir: Option<PathBuf>,
    target_dir: Option<PathBuf>,
    parallel: Option<bool>,
    http_timeout_secs: Option<u64>,
    toolchain: Option<ToolchainToml>,
    #[serde(rename = "artifact")]
    artifacts: Option<Vec<ArtifactToml>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ToolchainToml {
    program: Option<String>,
    build: Option<Vec<String>>,
    test: Option<Vec<String>>,
    lint: Option<Vec<String>>,
    doc: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactToml {
    name: String,
    version: String,
    url: String,
    checksum: Option<String>,
    select: Vec<String>,
    nested: Option<String>,
    destination: PathBuf,
}

impl ToolchainToml {
    fn apply(self, dst: &mut ToolchainConfig) {
        if let Some(program) = self.program {
            dst.program = program;
        }
        if let Some(build) = self.build {
            dst.build = build;
        }
        if let Some(test) = self.test {
            dst.test = test;
        }
        if let Some(lint) = self.lint {
            dst.lint = lint;
        }
        if let Some(doc) = self.doc {
            dst.doc = doc;
        }
    }
}

impl ArtifactToml {
    fn into_spec(self) -> Result<ArtifactSpec> {
        validate_name(&self.name)?;

        if !self.url.contains(VERSION_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "artifact '{}': url must contain {}",
                self.name, VERSION_PLACEHOLDER
            )));
        }

        validate_version(&self.name, &self.version)?;

        let Some(checksum) = self.checksum.as_deref() else {
            return Err(Error::Config(format!(
                "artifact '{}' has no pinned checksum: download {}, run `schema-acquire hash <file>` \
                 and set `checksum` in {}",
                self.name,
                self.url.replace(VERSION_PLACEHOLDER, &self.version),
                CONFIG_FILE
            )));
        };
        let checksum = checksum
            .parse::<Checksum>()
            .map_err(|e| Error::Config(format!("artifact '{}': {}", self.name, e)))?;

        if self.select.is_empty() {
            return Err(Error::Config(format!(
                "artifact '{}': select must name at least one pattern",
                self.name
            )));
        }
        let selector = Selector::new(&self.select)
            .map_err(|e| Error::Config(format!("artifact '{}': {}", self.name, e)))?;

        if !is_contained(&self.destination) {
            return Err(Error::Config(format!(
                "artifact '{}': destination must be a relative path inside the work directory",
                self.name
            )));
        }

        let layout = match self.nested {
            Some(entry) if entry.trim().is_empty() => {
                return Err(Error::Config(format!(
                    "artifact '{}': nested entry name is empty",
                    self.name
                )));
            }
            Some(entry) => ArtifactLayout::Nested { entry },
            None => ArtifactLayout::Plain,
        };

        Ok(ArtifactSpec {
            name: self.name,
            version: self.version,
            url_template: self.url,
            checksum,
            selector,
            layout,
            destination: self.destination,
        })
    }
}

/// A relative path that names something strictly below its base: no root or
/// prefix, no `..`, and at least one normal component (so not `""` or `.`).
fn is_contained(path: &Path) -> bool {
    let mut normal = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    normal
}

/// `work_dir` and `target_dir` are removed by `clean`, so they must stay
/// below the project root.
fn project_subdir(project_root: &Path, field: &str, path: PathBuf) -> Result<PathBuf> {
    if !is_contained(&path) {
        return Err(Error::Config(format!(
            "{} must be a relative path inside the project root, got '{}'",
            field,
            path.display()
        )));
    }
    Ok(project_root.join(path))
}

/// Artifact names become marker file names, so keep them to simple identifiers.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("artifact name cannot be empty".into()));
    }
    if name == "root" {
        return Err(Error::Config("artifact name 'root' is reserved".into()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::Config(format!(
            "invalid artifact name '{}': only alphanumeric characters, underscores, and hyphens are allowed",
            name
        )));
    }
    Ok(())
}

/// Versions are part of the marker file name.
fn validate_version(name: &str, version: &str) -> Result<()> {
    if version.is_empty()
        || !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(Error::Config(format!(
            "artifact '{}': invalid version '{}': only alphanumeric characters, '.', '_' and '-' are allowed",
            name, version
        )));
    }
    Ok(())
}

fn default_artifacts() -> Vec<ArtifactToml> {
    vec![
        ArtifactToml {
            name: "redfish".into(),
            version: REDFISH_VERSION.into(),
            url: REDFISH_URL.into(),
            checksum: REDFISH_SHA256.map(Into::into),
            select: vec!["csdl/*".into()],
            nested: None,
            destination: "redfish-csdl".into(),
        },
        ArtifactToml {
            name: "swordfish".into(),
            version: SWORDFISH_VERSION.into(),
            url: SWORDFISH_URL.into(),
            checksum: SWORDFISH_SHA256.map(Into::into),
            select: vec!["csdl-schema/*".into()],
            nested: Some(SWORDFISH_NESTED.into()),
            destination: "swordfish-csdl".into(),
        },
    ]
}

fn timeout_from_env() -> Option<u64> {
    std::env::var(HTTP_TIMEOUT_ENV)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
}

impl Config {
    /// Load configuration for a project.
    ///
    /// Reads `explicit` if given (it must exist), else `<project_root>/schemas.toml`
    /// if present, else uses the built-in artifact table. A file without an
    /// `[[artifact]]` table also uses the built-in one. Built-in entries
    /// without a pinned checksum are a configuration error.
    pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let candidate = project_root.join(CONFIG_FILE);
                candidate.exists().then_some(candidate)
            }
        };

        let raw = match &path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| Error::io("cannot read config", p, e))?;
                tracing::debug!(path = %p.display(), "loaded configuration file");
                toml::from_str::<ConfigToml>(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", p.display(), e)))?
            }
            None => ConfigToml::default(),
        };

        Self::from_toml(project_root, raw, timeout_from_env())
    }

    /// Parse configuration from TOML text (no file access).
    pub fn parse(project_root: &Path, content: &str) -> Result<Self> {
        let raw = toml::from_str::<ConfigToml>(content).map_err(|e| Error::Config(e.to_string()))?;
        Self::from_toml(project_root, raw, None)
    }

    /// Built-in table with every missing checksum filled in, for tests that
    /// never touch the network.
    #[cfg(test)]
    pub(crate) fn pinned_builtin(project_root: &Path) -> Self {
        let artifacts = default_artifacts()
            .into_iter()
            .map(|mut a| {
                a.checksum.get_or_insert_with(|| "0".repeat(64));
                a
            })
            .collect();
        let raw = ConfigToml {
            artifacts: Some(artifacts),
            ..Default::default()
        };
        match Self::from_toml(project_root, raw, None) {
            Ok(config) => config,
            Err(e) => panic!("built-in table is invalid: {e}"),
        }
    }

    fn from_toml(project_root: &Path, raw: ConfigToml, env_timeout: Option<u64>) -> Result<Self> {
        let work_dir = project_subdir(
            project_root,
            "work_dir",
            raw.work_dir.unwrap_or_else(|| DEFAULT_WORK_DIR.into()),
        )?;
        let target_dir = project_subdir(
            project_root,
            "target_dir",
            raw.target_dir.unwrap_or_else(|| DEFAULT_TARGET_DIR.into()),
        )?;

        let secs = env_timeout
            .or(raw.http_timeout_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
            .clamp(5, 3600);

        let mut toolchain = ToolchainConfig::default();
        if let Some(t) = raw.toolchain {
            t.apply(&mut toolchain);
        }

        let artifacts = raw
            .artifacts
            .unwrap_or_else(default_artifacts)
            .into_iter()
            .map(ArtifactToml::into_spec)
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for a in &artifacts {
            if !seen.insert(a.name.as_str()) {
                return Err(Error::Config(format!("duplicate artifact name '{}'", a.name)));
            }
        }

        Ok(Self {
            project_root: project_root.to_path_buf(),
            work_dir,
            target_dir,
            parallel: raw.parallel.unwrap_or(false),
            http_timeout: Duration::from_secs(secs),
            toolchain,
            artifacts,
        })
    }

    /// Look up an artifact by name.
    pub fn artifact(&self, name: &str) -> Option<&ArtifactSpec> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}
