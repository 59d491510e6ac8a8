//! Completion markers
//!
//! A marker is an empty file whose existence records that a stage finished.
//! Content is never read. Artifact markers are named after the artifact, its
//! version and the first hex characters of its pinned digest, so a changed
//! pin finds no marker:
//!
//! ```text
//! schemas/
//! ├── .root.done
//! ├── .redfish@2025.2-8a1c2f0e9b3d.done
//! └── .swordfish@v1.2.8-51f0a2c4d6e8.done
//! ```

use crate::config::ArtifactSpec;
use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Digest characters kept in an artifact marker name.
const STAMP_HEX_LEN: usize = 12;

/// Identifies one completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerId {
    /// The work directory exists.
    Root,
    /// An artifact has been fetched, verified and extracted at this
    /// version and digest.
    Artifact { name: String, stamp: String },
}

impl MarkerId {
    /// Marker for the artifact as currently pinned.
    pub fn artifact(spec: &ArtifactSpec) -> Self {
        let hex = spec.checksum.hex();
        let short = &hex[..hex.len().min(STAMP_HEX_LEN)];
        Self::Artifact {
            name: spec.name.clone(),
            stamp: format!("{}-{}", spec.version, short),
        }
    }

    /// Artifact name, or `None` for the root marker.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Artifact { name, .. } => Some(name),
        }
    }

    /// File name of the marker inside the work directory.
    pub fn file_name(&self) -> String {
        match self {
            Self::Root => ".root.done".to_string(),
            Self::Artifact { name, stamp } => format!(".{}@{}.done", name, stamp),
        }
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Artifact { name, stamp } => write!(f, "{}@{}", name, stamp),
        }
    }
}

/// Persistent existence-only flags.
pub trait MarkerStore: Send + Sync {
    /// Whether the marker is present. No side effects.
    fn exists(&self, id: &MarkerId) -> bool;

    /// Record the marker. A no-op if it is already present.
    fn mark(&self, id: &MarkerId) -> Result<()>;

    /// Remove the marker. Absence is success.
    fn clear(&self, id: &MarkerId) -> Result<()>;

    /// Remove every marker recorded for the named artifact, whatever its
    /// version or digest. Returns how many were removed.
    fn clear_artifact(&self, name: &str) -> Result<usize>;
}

/// Markers as files in a directory.
#[derive(Debug, Clone)]
pub struct FsMarkerStore {
    root: PathBuf,
}

impl FsMarkerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, id: &MarkerId) -> PathBuf {
        self.root.join(id.file_name())
    }
}

impl MarkerStore for FsMarkerStore {
    fn exists(&self, id: &MarkerId) -> bool {
        self.path(id).is_file()
    }

    fn mark(&self, id: &MarkerId) -> Result<()> {
        let path = self.path(id);
        if path.is_file() {
            return Ok(());
        }

        // Write-then-rename so a concurrent reader never sees a half-written marker.
        let tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| Error::io("cannot create marker", &self.root, e))?;
        tmp.persist(&path)
            .map_err(|e| Error::io("cannot write marker", &path, e.error))?;

        tracing::debug!(marker = %id, path = %path.display(), "marked");
        Ok(())
    }

    fn clear(&self, id: &MarkerId) -> Result<()> {
        let path = self.path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(marker = %id, "cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("cannot remove marker", &path, e)),
        }
    }

    fn clear_artifact(&self, name: &str) -> Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io("cannot read work directory", &self.root, e)),
        };

        // Names cannot contain '@', so the prefix belongs to exactly one artifact.
        let prefix = format!(".{}@", name);
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io("cannot read work directory", &self.root, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !(file_name.starts_with(&prefix) && file_name.ends_with(".done")) {
                continue;
            }
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io("cannot remove marker", &path, e)),
            }
        }

        if removed > 0 {
            tracing::debug!(artifact = %name, removed, "cleared artifact markers");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    fn spec(name: &str, version: &str, hex: char) -> ArtifactSpec {
        let mut spec = Config::pinned_builtin(std::path::Path::new("/project"))
            .artifact("redfish")
            .unwrap()
            .clone();
        spec.name = name.to_string();
        spec.version = version.to_string();
        spec.checksum = hex.to_string().repeat(64).parse().unwrap();
        spec
    }

    #[test]
    fn test_marker_file_names() {
        assert_eq!(MarkerId::Root.file_name(), ".root.done");
        assert_eq!(
            MarkerId::artifact(&spec("redfish", "2025.2", 'a')).file_name(),
            ".redfish@2025.2-aaaaaaaaaaaa.done"
        );
    }

    #[test]
    fn test_marker_identity_follows_pin() {
        let base = MarkerId::artifact(&spec("redfish", "2025.2", 'a'));
        assert_eq!(base, MarkerId::artifact(&spec("redfish", "2025.2", 'a')));
        assert_ne!(base, MarkerId::artifact(&spec("redfish", "2026.1", 'a')));
        assert_ne!(base, MarkerId::artifact(&spec("redfish", "2025.2", 'b')));
        assert_eq!(base.name(), Some("redfish"));
        assert_eq!(MarkerId::Root.name(), None);
    }

    #[test]
    fn test_mark_then_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMarkerStore::new(dir.path());
        let id = MarkerId::artifact(&spec("redfish", "2025.2", 'a'));

        assert!(!store.exists(&id));
        store.mark(&id).unwrap();
        assert!(store.exists(&id));
        assert!(dir.path().join(".redfish@2025.2-aaaaaaaaaaaa.done").is_file());
        assert!(!store.exists(&MarkerId::Root));
        assert!(!store.exists(&MarkerId::artifact(&spec("redfish", "2026.1", 'a'))));
    }

    #[test]
    fn test_mark_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMarkerStore::new(dir.path());
        store.mark(&MarkerId::Root).unwrap();
        store.mark(&MarkerId::Root).unwrap();

        // Only the marker itself, no leftover temp files.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_concurrent_mark_of_same_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsMarkerStore::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.mark(&MarkerId::Root))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert!(store.exists(&MarkerId::Root));
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_clear_absent_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMarkerStore::new(dir.path());
        store
            .clear(&MarkerId::artifact(&spec("swordfish", "v1.2.8", 'c')))
            .unwrap();
    }

    #[test]
    fn test_clear_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMarkerStore::new(dir.path());
        let id = MarkerId::artifact(&spec("swordfish", "v1.2.8", 'c'));
        store.mark(&id).unwrap();
        store.clear(&id).unwrap();
        assert!(!store.exists(&id));
    }

    #[test]
    fn test_clear_artifact_removes_every_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMarkerStore::new(dir.path());
        let old = MarkerId::artifact(&spec("red", "1", 'a'));
        let new = MarkerId::artifact(&spec("red", "2", 'b'));
        let other = MarkerId::artifact(&spec("red-fish", "1", 'a'));
        for id in [&old, &new, &other, &MarkerId::Root] {
            store.mark(id).unwrap();
        }

        assert_eq!(store.clear_artifact("red").unwrap(), 2);
        assert!(!store.exists(&old));
        assert!(!store.exists(&new));
        assert!(store.exists(&other));
        assert!(store.exists(&MarkerId::Root));
        assert_eq!(store.clear_artifact("red").unwrap(), 0);
    }

    #[test]
    fn test_clear_artifact_without_directory_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMarkerStore::new(dir.path().join("missing"));
        assert_eq!(store.clear_artifact("redfish").unwrap(), 0);
    }

    #[test]
    fn test_mark_without_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMarkerStore::new(dir.path().join("missing"));
        let err = store.mark(&MarkerId::Root).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_directory_is_not_a_marker() {
        let dir = tempfile::tempdir().unwrap();
        let id = MarkerId::artifact(&spec("redfish", "2025.2", 'a'));
        fs::create_dir(dir.path().join(id.file_name())).unwrap();
        let store = FsMarkerStore::new(dir.path());
        assert!(!store.exists(&id));
    }
}
