//! Pipeline lock management
//!
//! Provides exclusive locking so two processes never acquire into, or clean,
//! the same work directory at once.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Lock file path for a work directory: a sibling named `<work_dir>.lock`.
///
/// The lock lives outside the work directory so `clean` can remove the whole
/// directory while holding it.
pub fn lock_path(work_dir: &Path) -> PathBuf {
    let mut name = work_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "schemas".into());
    name.push(".lock");
    work_dir.with_file_name(name)
}

/// Acquire an exclusive lock for a work directory.
/// Returns a guard that releases the lock when dropped.
pub fn acquire_pipeline_lock(work_dir: &Path) -> Result<PipelineLock> {
    let path = lock_path(work_dir);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io("cannot create lock directory", parent, e))?;
    }

    let file = File::create(&path).map_err(|e| Error::io("cannot create lock file", &path, e))?;

    if file.try_lock_exclusive().is_err() {
        return Err(Error::Locked(format!(
            "'{}' is in use by another process (lock held on '{}')",
            work_dir.display(),
            path.display()
        )));
    }

    Ok(PipelineLock { file })
}

/// RAII guard for the pipeline lock - releases the lock when dropped.
///
/// The lock file itself is left in place. Unlinking it would let a waiter
/// hold a lock on an orphaned inode while another process locks a new file.
#[derive(Debug)]
pub struct PipelineLock {
    file: File,
}

impl Drop for PipelineLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
