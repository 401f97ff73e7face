//! Ephemeral directories owned by a single pipeline run

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory removed when dropped
///
/// With `retain` set the directory is left on disk for debugging instead.
/// Removal is tied to the value's lifetime, so every exit path of the
/// owning scope cleans up, including early returns and unwinding.
#[derive(Debug)]
pub struct EphemeralDir {
    dir: Option<TempDir>,
    path: PathBuf,
    retain: bool,
}

impl EphemeralDir {
    /// Create a directory named `<prefix><random>` under `parent`, or under
    /// the system temp dir when no parent is given.
    pub fn create(prefix: &str, parent: Option<&Path>, retain: bool) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();

        tracing::debug!(path = %path.display(), retain, "created ephemeral directory");

        Ok(Self {
            dir: Some(dir),
            path,
            retain,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EphemeralDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        if self.retain {
            let path = dir.keep();
            tracing::info!(path = %path.display(), "retaining ephemeral directory");
            return;
        }

        match dir.close() {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "removed ephemeral directory")
            }
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove ephemeral directory"
            ),
        }
    }
}
