//! Thumbnail extraction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use vflix_models::ThumbnailSpec;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::paths::PathDeriver;

/// Produces a still image from a source asset.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Capture one frame of `source` and return the written image path.
    async fn extract(&self, source: &Path, spec: &ThumbnailSpec) -> MediaResult<PathBuf>;
}

/// FFmpeg-backed frame extractor writing into the configured thumbnail directory.
#[derive(Debug, Clone)]
pub struct ThumbnailExtractor {
    paths: PathDeriver,
    runner: FfmpegRunner,
}

impl ThumbnailExtractor {
    pub fn new(paths: PathDeriver, runner: FfmpegRunner) -> Self {
        Self { paths, runner }
    }

    /// Build the extraction command for `source` writing to `output`.
    pub fn command(source: &Path, output: &Path, spec: &ThumbnailSpec) -> FfmpegCommand {
        FfmpegCommand::new(source, output)
            .seek_output(spec.offset_timestamp())
            .single_frame()
            .video_filter(spec.scale_filter())
            .update_single_image()
            .operation("thumbnail")
    }
}

#[async_trait]
impl FrameExtractor for ThumbnailExtractor {
    async fn extract(&self, source: &Path, spec: &ThumbnailSpec) -> MediaResult<PathBuf> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(MediaError::SourceNotFound(source.to_path_buf()));
        }

        let output = self.paths.thumbnail_path(source)?;
        tokio::fs::create_dir_all(self.paths.thumbnail_dir()).await?;

        let cmd = Self::command(source, &output, spec);
        self.runner.run(&cmd).await?;

        metrics::counter!("vflix_thumbnails_extracted_total").increment(1);
        info!(
            source = %source.display(),
            thumbnail = %output.display(),
            "Extracted thumbnail at {}",
            spec.offset_timestamp()
        );
        Ok(output)
    }
}
