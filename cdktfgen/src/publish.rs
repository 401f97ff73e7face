//! Publishing the generated package into the output directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::config::is_single_segment;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("package name {0:?} is not a single path segment")]
    InvalidPackageName(String),

    #[error("generated package not found at {0:?}")]
    MissingArtifacts(PathBuf),

    #[error("clean output dir {path:?}: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("create output dir {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("walk generated package: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Replace `<output_base>/<package_name>` with a copy of `src_dir`.
///
/// An existing destination is removed entirely first; nothing from a
/// previous run survives. Returns the destination path.
pub fn publish_output(
    src_dir: &Path,
    output_base: &Path,
    package_name: &str,
) -> Result<PathBuf, PublishError> {
    if !is_single_segment(package_name) {
        return Err(PublishError::InvalidPackageName(package_name.to_string()));
    }
    if !src_dir.is_dir() {
        return Err(PublishError::MissingArtifacts(src_dir.to_path_buf()));
    }

    let output_dir = output_base.join(package_name);

    tracing::debug!(output_dir = %output_dir.display(), "ensuring output dir is clean");
    if output_dir.exists() {
        fs::remove_dir_all(&output_dir).map_err(|source| PublishError::Clean {
            path: output_dir.clone(),
            source,
        })?;
    }
    fs::create_dir_all(&output_dir).map_err(|source| PublishError::Create {
        path: output_dir.clone(),
        source,
    })?;

    tracing::debug!(
        src_dir = %src_dir.display(),
        output_dir = %output_dir.display(),
        "copying to output dir"
    );
    copy_tree(src_dir, &output_dir)?;

    Ok(output_dir)
}

fn copy_tree(src_dir: &Path, dst_dir: &Path) -> Result<(), PublishError> {
    for entry in WalkDir::new(src_dir).min_depth(1).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|e| PublishError::Copy {
                from: entry.path().to_path_buf(),
                to: dst_dir.to_path_buf(),
                source: io::Error::other(e),
            })?;
        let target = dst_dir.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|source| PublishError::Create {
                path: target.clone(),
                source,
            })?;
        } else {
            fs::copy(entry.path(), &target).map_err(|source| PublishError::Copy {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                source,
            })?;
        }
    }

    Ok(())
}
