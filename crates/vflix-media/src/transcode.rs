//! Resolution transcodes and in-place relabelling.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use vflix_models::ResolutionTarget;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::paths::derive_variant_path;

/// Produces one resolution variant of a source asset per call.
///
/// Output is encoded into a hidden staging file next to the final path and
/// renamed into place on success, so the derived path only ever holds a
/// complete file. The staging file is removed on failure and when the call is
/// dropped mid-encode. Re-running a job overwrites the same path.
#[derive(Debug, Clone, Default)]
pub struct TranscodeWorker {
    runner: FfmpegRunner,
}

impl TranscodeWorker {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    /// Build the encode command for `source` writing to `output`.
    pub fn command(source: &Path, output: &Path, target: &ResolutionTarget) -> FfmpegCommand {
        FfmpegCommand::new(source, output)
            .output_args(target.to_ffmpeg_args())
            .with_progress()
            .operation("transcode")
    }

    /// Encode `source` into its `target.label` variant and return the variant path.
    pub async fn transcode(&self, source: &Path, target: &ResolutionTarget) -> MediaResult<PathBuf> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(MediaError::SourceNotFound(source.to_path_buf()));
        }

        let output = derive_variant_path(source, &target.label)?;
        let staging = staging_file(&output)?;

        let cmd = Self::command(source, staging.path(), target);
        let label = target.label.clone();
        let result = self
            .runner
            .run_with_progress(&cmd, move |p| {
                debug!(
                    variant = %label,
                    frame = p.frame,
                    out_time_ms = p.out_time_ms,
                    speed = p.speed,
                    "Transcode progress"
                );
            })
            .await;

        // On error the staging file is deleted as it drops.
        result?;
        staging.persist(&output).map_err(|e| MediaError::Io(e.error))?;

        info!(
            source = %source.display(),
            output = %output.display(),
            variant = %target.label,
            "Transcoded variant {}",
            target.dimensions()
        );
        Ok(output)
    }
}

/// Hidden sibling of `output` that keeps its extension for format detection.
fn staging_file(output: &Path) -> MediaResult<NamedTempFile> {
    let name = output
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MediaError::invalid_path(format!("no file name in {}", output.display())))?;
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".")
        .suffix(&format!(".{}", name))
        .tempfile_in(dir)?;
    Ok(staging)
}

/// Move the source file itself to its `label` variant path.
///
/// This replaces the original asset path, so callers must make sure no other
/// job still reads `source`. Running it again after a completed move returns
/// the variant path without touching anything.
pub async fn relabel_in_place(source: &Path, label: &str) -> MediaResult<PathBuf> {
    let target = derive_variant_path(source, label)?;

    let source_exists = tokio::fs::try_exists(source).await.unwrap_or(false);
    if !source_exists {
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %target.display(), "Source already relabelled");
            return Ok(target);
        }
        return Err(MediaError::SourceNotFound(source.to_path_buf()));
    }

    move_file(source, &target).await?;
    info!(
        source = %source.display(),
        target = %target.display(),
        "Relabelled source as {}",
        label
    );
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_transcode_command_matches_tool_contract() {
        let target = ResolutionTarget::preset("720p").unwrap();
        let cmd = TranscodeWorker::command(
            Path::new("/media/videos/clip.mp4"),
            Path::new("/media/videos/clip_720p.mp4"),
            &target,
        );
        let args = cmd.build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(
            &args[i..],
            &[
                "-i",
                "/media/videos/clip.mp4",
                "-s",
                "1280x720",
                "-c:v",
                "libx264",
                "-crf",
                "23",
                "-c:a",
                "aac",
                "/media/videos/clip_720p.mp4",
            ]
        );
    }

    #[test]
    fn test_staging_file_is_hidden_sibling() {
        let dir = TempDir::new().unwrap();
        let staging = staging_file(&dir.path().join("clip_720p.mp4")).unwrap();
        let path = staging.path().to_path_buf();

        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with('.'));

        drop(staging);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_transcode_rejects_extensionless_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("movie");
        tokio::fs::write(&source, b"data").await.unwrap();

        let err = TranscodeWorker::default()
            .transcode(&source, &ResolutionTarget::preset("480p").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidPath(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_encode_leaves_no_variant() {
        let Ok(false_bin) = which::which("false") else { return };
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        tokio::fs::write(&source, b"data").await.unwrap();

        let worker = TranscodeWorker::new(FfmpegRunner::new().with_program(false_bin));
        let err = worker
            .transcode(&source, &ResolutionTarget::preset("720p").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::ExternalTool { .. }));
        assert_eq!(entries(dir.path()), ["clip.mp4"]);
    }

    /// Stand-in encoder that writes to its last argument, then hangs.
    #[cfg(unix)]
    fn hanging_encoder(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\nprintf partial > \"$last\"\nexec sleep 30\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_encode_removes_staging_file() {
        let bin = TempDir::new().unwrap();
        let videos = TempDir::new().unwrap();
        let source = videos.path().join("clip.mp4");
        tokio::fs::write(&source, b"data").await.unwrap();

        let worker = TranscodeWorker::new(FfmpegRunner::new().with_program(hanging_encoder(bin.path())));
        let target = ResolutionTarget::preset("720p").unwrap();
        {
            let encode = worker.transcode(&source, &target);
            tokio::pin!(encode);
            // Wait until the encoder has written into the staging file.
            let started = async {
                loop {
                    let written = std::fs::read_dir(videos.path()).unwrap().any(|e| {
                        let e = e.unwrap();
                        e.file_name().to_string_lossy().starts_with('.')
                            && e.metadata().map(|m| m.len() > 0).unwrap_or(false)
                    });
                    if written {
                        break;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
            };
            tokio::select! {
                _ = &mut encode => panic!("encode finished unexpectedly"),
                _ = tokio::time::timeout(std::time::Duration::from_secs(5), started) => {}
            }
        }

        assert_eq!(entries(videos.path()), ["clip.mp4"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_timeout_removes_staging_file() {
        let bin = TempDir::new().unwrap();
        let videos = TempDir::new().unwrap();
        let source = videos.path().join("clip.mp4");
        tokio::fs::write(&source, b"data").await.unwrap();

        let runner = FfmpegRunner::new()
            .with_program(hanging_encoder(bin.path()))
            .with_timeout(std::time::Duration::from_millis(300));
        let err = TranscodeWorker::new(runner)
            .transcode(&source, &ResolutionTarget::preset("720p").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Timeout(_)));
        assert_eq!(entries(videos.path()), ["clip.mp4"]);
    }

    #[tokio::test]
    async fn test_relabel_in_place_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        tokio::fs::write(&source, b"original").await.unwrap();

        let first = relabel_in_place(&source, "1080p").await.unwrap();
        assert_eq!(first, dir.path().join("clip_1080p.mp4"));
        assert!(!source.exists());

        let second = relabel_in_place(&source, "1080p").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(tokio::fs::read(&second).await.unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_relabel_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = relabel_in_place(&dir.path().join("gone.mp4"), "1080p")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceNotFound(_)));
    }
}
