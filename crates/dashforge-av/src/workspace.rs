//! Per-invocation working directory and file moves.
//!
//! A [`Workspace`] is a uniquely named temporary directory under the
//! configured working directory. Transcoder outputs are written there, so
//! concurrent invocations never collide on intermediate filenames, and
//! anything left behind is removed when the workspace is dropped.

use std::path::{Path, PathBuf};

use dashforge_core::{Error, Result, StreamFile};
use tempfile::TempDir;

/// Temporary directory owning one invocation's intermediate files.
///
/// # Example
///
/// ```no_run
/// use dashforge_av::Workspace;
///
/// let workspace = Workspace::new_in(&std::env::temp_dir()).unwrap();
/// let intermediate = workspace.temp_file("movie_3000.mp4");
/// assert!(intermediate.starts_with(workspace.path()));
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace inside `parent`.
    pub fn new_in(parent: &Path) -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("dashforge-")
            .tempdir_in(parent)
            .map_err(|e| {
                Error::tool(
                    "workspace",
                    format!("failed to create temp dir in {}: {e}", parent.display()),
                )
            })?;
        Ok(Self { temp_dir })
    }

    /// Path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a path for a named temporary file inside the workspace.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Whether `path` lies inside the workspace directory.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(self.temp_dir.path())
    }
}

/// Move `file` into `dest_dir`, keeping its file name.
///
/// An existing file at the destination is replaced. Returns the relocated
/// [`StreamFile`]; the original value is left untouched.
pub fn relocate(file: &StreamFile, dest_dir: &Path) -> Result<StreamFile> {
    let name = file.path.file_name().ok_or_else(|| {
        Error::Validation(format!("cannot relocate {}: no file name", file.path.display()))
    })?;
    let dest = dest_dir.join(name);

    if dest == file.path {
        return Ok(file.clone());
    }
    if dest.exists() {
        std::fs::remove_file(&dest)?;
    }

    // Try rename first (same filesystem), fall back to copy+remove.
    if std::fs::rename(&file.path, &dest).is_err() {
        std::fs::copy(&file.path, &dest)?;
        remove_best_effort(&file.path);
    }

    Ok(file.moved_to(&dest))
}

/// Delete `path`, logging instead of failing. Returns whether a file was removed.
pub fn remove_best_effort(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("removed {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("failed to remove {}: {e}", path.display());
            false
        }
    }
}
