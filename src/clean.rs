//! Destroy all pipeline state.

use crate::config::Config;
use crate::core::lock::acquire_pipeline_lock;
use crate::core::output;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path};

/// Remove the work directory (markers and extracted schemas) and the
/// toolchain target directory. Missing directories are fine.
///
/// Both directories must lie strictly below the project root; anything else
/// is refused before the lock is taken or a file is touched.
pub fn clean(config: &Config) -> Result<()> {
    for dir in [&config.work_dir, &config.target_dir] {
        ensure_below_root(&config.project_root, dir)?;
    }
    let _lock = acquire_pipeline_lock(&config.work_dir)?;

    output::action("Cleaning");
    for dir in [&config.work_dir, &config.target_dir] {
        if remove_dir(dir)? {
            output::sub_action(&format!("removed {}", dir.display()));
        } else {
            output::detail(&format!("{} not present", dir.display()));
        }
    }
    Ok(())
}

fn ensure_below_root(project_root: &Path, dir: &Path) -> Result<()> {
    let below = match dir.strip_prefix(project_root) {
        Ok(rel) => {
            rel.components().any(|c| matches!(c, Component::Normal(_)))
                && rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        }
        Err(_) => false,
    };
    if !below {
        return Err(Error::Config(format!(
            "refusing to remove {}: not inside project root {}",
            dir.display(),
            project_root.display()
        )));
    }
    Ok(())
}

/// Returns whether anything was removed.
fn remove_dir(dir: &Path) -> Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::debug!(path = %dir.display(), "removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io("cannot remove directory", dir, e)),
    }
}
