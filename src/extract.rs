//! Archive extraction
//!
//! Extracts selected entries from an in-memory archive into one flat
//! directory. Supports zip and the tar family (plain, gz, xz, bz2, zst)
//! using native Rust libraries, no external tools.
//!
//! Two primitives:
//!
//! - [`extract`] writes every entry matching a [`Selector`] to
//!   `dest/<basename>`, overwriting existing files;
//! - [`read_entry`] returns the bytes of exactly one named entry, which is how
//!   an archive inside an archive is opened before `extract` runs on it.

use crate::core::output::{self, ProgressGuard};
use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

/// Glob patterns selecting archive entries by path.
///
/// Patterns match the whole entry path (with any leading `./` removed). `*`
/// also matches `/`, so `csdl/*` selects everything below `csdl/`.
#[derive(Debug, Clone)]
pub struct Selector {
    patterns: Vec<glob::Pattern>,
}

impl Selector {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, glob::PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| glob::Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<_> = self.patterns.iter().map(|p| p.as_str()).collect();
        f.write_str(&patterns.join(", "))
    }
}

/// Supported archive containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarXz,
    TarBz2,
    TarZst,
}

impl ArchiveFormat {
    /// Detect archive format from a file name extension.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::TarZst)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Detect archive format from leading magic bytes.
    ///
    /// Compressed streams are assumed to wrap a tar archive.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else if bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::TarXz)
        } else if bytes.starts_with(b"BZh") {
            Some(Self::TarBz2)
        } else if bytes.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Some(Self::TarZst)
        } else if bytes.len() >= 262 && &bytes[257..262] == b"ustar" {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Name first, then content.
    pub fn detect(name: &str, bytes: &[u8]) -> Option<Self> {
        Self::from_name(name).or_else(|| Self::sniff(bytes))
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::TarBz2 => "tar.bz2",
            Self::TarZst => "tar.zst",
        })
    }
}

/// Detect the format of `bytes` or fail with an extraction error.
pub fn detect_format(artifact: &str, name: &str, bytes: &[u8]) -> Result<ArchiveFormat> {
    ArchiveFormat::detect(name, bytes)
        .ok_or_else(|| Error::extraction(artifact, format!("cannot detect archive format: {}", name)))
}

/// Entry path as matched by selectors: forward slashes, no leading `./`.
fn normalize_entry_name(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut s = name.as_str();
    while let Some(rest) = s.strip_prefix("./") {
        s = rest;
    }
    s.to_string()
}

/// Last path segment, or `None` if it cannot name a file.
fn base_name(name: &str) -> Option<&str> {
    let base = name.trim_end_matches('/').rsplit('/').next()?;
    match base {
        "" | "." | ".." => None,
        b => Some(b),
    }
}

/// Call `f` for every regular-file entry of the archive, in archive order.
fn for_each_file(
    artifact: &str,
    bytes: &[u8],
    format: ArchiveFormat,
    mut f: impl FnMut(&str, &mut dyn Read) -> Result<()>,
) -> Result<()> {
    match format {
        ArchiveFormat::Zip => {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| Error::extraction(artifact, format!("zip read error: {}", e)))?;

            for i in 0..archive.len() {
                let mut file = archive
                    .by_index(i)
                    .map_err(|e| Error::extraction(artifact, format!("zip entry error: {}", e)))?;
                if file.is_dir() {
                    continue;
                }
                let name = normalize_entry_name(file.name());
                f(&name, &mut file)?;
            }
        }
        _ => {
            let reader = tar_reader(artifact, bytes, format)?;
            let mut archive = tar::Archive::new(reader);

            for entry in archive
                .entries()
                .map_err(|e| Error::extraction(artifact, format!("tar read error: {}", e)))?
            {
                let mut entry = entry
                    .map_err(|e| Error::extraction(artifact, format!("tar entry error: {}", e)))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let name = entry
                    .path()
                    .map_err(|e| Error::extraction(artifact, format!("tar path error: {}", e)))?
                    .to_string_lossy()
                    .into_owned();
                let name = normalize_entry_name(&name);
                f(&name, &mut entry)?;
            }
        }
    }
    Ok(())
}

fn tar_reader<'a>(
    artifact: &str,
    bytes: &'a [u8],
    format: ArchiveFormat,
) -> Result<Box<dyn Read + 'a>> {
    let reader: Box<dyn Read + 'a> = match format {
        ArchiveFormat::Tar => Box::new(bytes),
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(bytes)),
        ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new(bytes)),
        ArchiveFormat::TarBz2 => Box::new(bzip2::read::BzDecoder::new(bytes)),
        ArchiveFormat::TarZst => Box::new(
            zstd::stream::read::Decoder::new(bytes)
                .map_err(|e| Error::extraction(artifact, format!("zstd init error: {}", e)))?,
        ),
        ArchiveFormat::Zip => {
            return Err(Error::extraction(artifact, "zip is not a tar stream"));
        }
    };
    Ok(reader)
}

/// Write one entry to `dest/<file_name>` via a temp file and rename, replacing
/// any existing file.
fn write_flat(dest: &Path, file_name: &str, reader: &mut dyn Read) -> Result<()> {
    let target = dest.join(file_name);
    let mut tmp = tempfile::NamedTempFile::new_in(dest)
        .map_err(|e| Error::io("cannot create temporary file", dest, e))?;

    std::io::copy(reader, &mut tmp).map_err(|e| Error::io("write error", &target, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| Error::io("chmod failed", &target, e))?;
    }

    tmp.persist(&target)
        .map_err(|e| Error::io("cannot write", &target, e.error))?;
    Ok(())
}

/// Extract every file entry matching `selector` into `dest`, flattened.
///
/// Returns the number of files written. Entries with the same base name
/// overwrite each other in archive order. Zero matches is an error so an
/// empty extraction can never be recorded as complete.
pub fn extract(
    artifact: &str,
    bytes: &[u8],
    format: ArchiveFormat,
    selector: &Selector,
    dest: &Path,
) -> Result<usize> {
    fs::create_dir_all(dest).map_err(|e| Error::io("cannot create destination", dest, e))?;

    let pb = output::spinner(&format!("extracting {} ({})", artifact, format));
    let _guard = ProgressGuard::new(&pb);

    let mut written = 0usize;
    for_each_file(artifact, bytes, format, |name, reader| {
        if !selector.matches(name) {
            return Ok(());
        }
        let file_name = base_name(name).ok_or_else(|| {
            Error::extraction(artifact, format!("entry has no usable file name: {}", name))
        })?;
        tracing::trace!(artifact, entry = name, file = file_name, "extract");
        write_flat(dest, file_name, reader)?;
        written += 1;
        Ok(())
    })?;

    if written == 0 {
        return Err(Error::extraction(
            artifact,
            format!("no entries match {} in {} archive", selector, format),
        ));
    }

    tracing::debug!(artifact, files = written, dest = %dest.display(), "extracted");
    Ok(written)
}

/// Read the bytes of the single entry whose path or base name equals `entry`.
///
/// Fails if the entry is absent or if more than one entry carries that name.
pub fn read_entry(
    artifact: &str,
    bytes: &[u8],
    format: ArchiveFormat,
    entry: &str,
) -> Result<Vec<u8>> {
    let wanted = normalize_entry_name(entry);
    let mut found: Option<Vec<u8>> = None;
    let mut matches = 0usize;

    for_each_file(artifact, bytes, format, |name, reader| {
        if name != wanted && base_name(name) != Some(wanted.as_str()) {
            return Ok(());
        }
        matches += 1;
        if found.is_none() {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).map_err(|e| {
                Error::extraction(artifact, format!("cannot read entry {}: {}", name, e))
            })?;
            found = Some(buf);
        }
        Ok(())
    })?;

    match (found, matches) {
        (Some(buf), 1) => Ok(buf),
        (None, _) => Err(Error::extraction(
            artifact,
            format!("nested archive '{}' not found", entry),
        )),
        (Some(_), n) => Err(Error::extraction(
            artifact,
            format!("expected exactly one entry named '{}', found {}", entry, n),
        )),
    }
}
