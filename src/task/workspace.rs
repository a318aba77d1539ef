//! Per-task workspace directories on the host.
//!
//! Each task gets `<workspaces_root>/<instance_id>/`, which is bind-mounted
//! into its container. Fixture files, when present, are copied in before
//! the container starts.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Recursively copies `src` into `dst`, creating `dst` if needed.
///
/// Symlinks are recreated as symlinks rather than followed.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !dst.exists() {
        std::fs::create_dir_all(dst)?;
    }

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&path)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dest_path)?;
            #[cfg(not(unix))]
            std::fs::copy(&path, &dest_path).map(|_| ())?;
        } else {
            std::fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}

/// Creates a fresh workspace for `instance_id` and returns its absolute path.
///
/// A workspace left over from an earlier run with the same output directory
/// is removed first so no state leaks between runs.
pub fn prepare_workspace(
    workspaces_root: &Path,
    instance_id: &str,
    fixtures: Option<&Path>,
) -> std::io::Result<PathBuf> {
    let workspace = workspaces_root.join(instance_id);
    if workspace.exists() {
        debug!(path = %workspace.display(), "Removing stale workspace");
        std::fs::remove_dir_all(&workspace)?;
    }
    std::fs::create_dir_all(&workspace)?;

    if let Some(fixtures) = fixtures {
        copy_dir_recursive(fixtures, &workspace)?;
        info!(task_id = %instance_id, from = %fixtures.display(), "Copied fixtures into workspace");
    }

    // Docker bind mounts need an absolute host path.
    std::fs::canonicalize(&workspace)
}
