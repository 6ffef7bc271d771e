//! Filesystem helpers for derived artifacts.
//!
//! Moves that may cross filesystems, and removals that treat an already
//! absent file as a normal outcome.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// What happened to a path handed to [`remove_if_exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    Missing,
}

/// Remove an artifact, failing with [`MediaError::MissingArtifact`] when absent.
pub async fn remove_artifact(path: impl AsRef<Path>) -> MediaResult<()> {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(MediaError::MissingArtifact(path.to_path_buf()))
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Remove an artifact, reporting an absent file instead of failing.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<RemovalOutcome> {
    let path = path.as_ref();
    match remove_artifact(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed artifact");
            Ok(RemovalOutcome::Removed)
        }
        Err(MediaError::MissingArtifact(_)) => {
            debug!(path = %path.display(), "Artifact already absent");
            Ok(RemovalOutcome::Missing)
        }
        Err(e) => Err(e),
    }
}

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a rename first and falls back to copy-then-delete on EXDEV. The copy
/// lands in a temporary sibling of `dst` and is renamed into place.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(MediaError::SourceNotFound(src.to_path_buf()))
        }
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename detected, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is error code 18 on Linux/macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = dst.with_extension("tmp");

    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(
            "Failed to remove source file after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}
