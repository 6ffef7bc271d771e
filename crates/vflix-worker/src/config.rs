//! Pipeline and worker configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vflix_cache::CachePolicy;
use vflix_media::{FfmpegRunner, PathDeriver};
use vflix_models::{parse_timestamp, ResolutionTarget, ThumbnailSpec};

use crate::error::{WorkerError, WorkerResult};
use crate::retry::RetryConfig;

const DEFAULT_RENDITIONS: &str = "480p,720p";

/// What to derive from each asset and where to put it.
///
/// Ingestion and deletion both read the variant set from here.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root that stored thumbnail paths are relative to
    pub media_root: PathBuf,
    /// Directory thumbnails are written into
    pub thumbnail_dir: PathBuf,
    /// Frame capture settings
    pub thumbnail: ThumbnailSpec,
    /// Resolution variants produced for every asset, in enqueue order
    pub renditions: Vec<ResolutionTarget>,
    /// Label the original source is moved to once all transcodes finish
    pub relabel_original_as: Option<String>,
    /// Cache handling after ingestion and deletion
    pub cache_policy: CachePolicy,
    /// FFmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Per-invocation limit for FFmpeg
    pub tool_timeout: Duration,
    /// Retry budget for handing jobs to the queue
    pub enqueue_retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let media_root = PathBuf::from("./media");
        Self {
            thumbnail_dir: media_root.join("thumbnails"),
            media_root,
            thumbnail: ThumbnailSpec::default(),
            renditions: ResolutionTarget::parse_list(DEFAULT_RENDITIONS).unwrap_or_default(),
            relabel_original_as: None,
            cache_policy: CachePolicy::Full,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            tool_timeout: Duration::from_secs(3600),
            enqueue_retry: RetryConfig::new("enqueue")
                .with_max_retries(3)
                .with_base_delay(Duration::from_millis(200)),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let media_root = std::env::var("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.media_root);
        let thumbnail_dir = std::env::var("THUMBNAIL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| media_root.join("thumbnails"));

        let offset_secs = match std::env::var("THUMBNAIL_OFFSET") {
            Ok(raw) => parse_timestamp(&raw)
                .map_err(|e| WorkerError::config_error(format!("THUMBNAIL_OFFSET: {}", e)))?,
            Err(_) => defaults.thumbnail.offset_secs,
        };
        let thumbnail = ThumbnailSpec {
            offset_secs,
            width: env_parse("THUMBNAIL_WIDTH")?.unwrap_or(defaults.thumbnail.width),
            height: env_parse("THUMBNAIL_HEIGHT")?.unwrap_or(defaults.thumbnail.height),
        };

        let renditions_raw =
            std::env::var("RENDITIONS").unwrap_or_else(|_| DEFAULT_RENDITIONS.to_string());
        let renditions = ResolutionTarget::parse_list(&renditions_raw)
            .map_err(|e| WorkerError::config_error(format!("RENDITIONS: {}", e)))?;

        let relabel_original_as = std::env::var("RELABEL_ORIGINAL_AS")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let cache_policy = match std::env::var("CACHE_INVALIDATION") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| WorkerError::config_error(format!("CACHE_INVALIDATION: {}", e)))?,
            Err(_) => defaults.cache_policy,
        };

        let enqueue_retry = RetryConfig::new("enqueue")
            .with_max_retries(env_parse("ENQUEUE_MAX_RETRIES")?.unwrap_or(3))
            .with_base_delay(Duration::from_millis(
                env_parse("ENQUEUE_RETRY_BASE_MS")?.unwrap_or(200),
            ));

        let config = Self {
            media_root,
            thumbnail_dir,
            thumbnail,
            renditions,
            relabel_original_as,
            cache_policy,
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            tool_timeout: Duration::from_secs(
                env_parse("FFMPEG_TIMEOUT_SECS")?.unwrap_or(defaults.tool_timeout.as_secs()),
            ),
            enqueue_retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that variant labels are unique and the thumbnail size is usable.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.thumbnail.width == 0 || self.thumbnail.height == 0 {
            return Err(WorkerError::config_error("thumbnail dimensions must be non-zero"));
        }

        let mut seen = HashSet::new();
        for label in self.variant_labels() {
            if label.is_empty() || label.contains(['/', '\\']) {
                return Err(WorkerError::config_error(format!("invalid variant label '{}'", label)));
            }
            if !seen.insert(label) {
                return Err(WorkerError::config_error(format!("duplicate variant label '{}'", label)));
            }
        }
        Ok(())
    }

    /// Every label with a derived file next to the source, relabel included.
    pub fn variant_labels(&self) -> impl Iterator<Item = &str> {
        self.renditions
            .iter()
            .map(|t| t.label.as_str())
            .chain(self.relabel_original_as.as_deref())
    }

    pub fn deriver(&self) -> PathDeriver {
        PathDeriver::new(&self.thumbnail_dir)
    }

    /// FFmpeg runner for this configuration.
    pub fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new()
            .with_program(&self.ffmpeg_path)
            .with_timeout(self.tool_timeout)
    }

    /// Path recorded on the asset for an extracted thumbnail.
    ///
    /// Relative to the media root when the thumbnail lies under it.
    pub fn stored_thumbnail_path(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix(&self.media_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute.to_path_buf())
    }

    /// Filesystem location of a thumbnail path recorded on an asset.
    pub fn resolve_stored_path(&self, stored: &Path) -> PathBuf {
        if stored.is_absolute() {
            stored.to_path_buf()
        } else {
            self.media_root.join(stored)
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Pause before a fenced job is put back on the queue
    pub reschedule_delay: Duration,
    /// Reschedules allowed before a fenced job is dead-lettered
    pub max_reschedules: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            reschedule_delay: Duration::from_secs(5),
            max_reschedules: 720,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: secs("WORKER_JOB_TIMEOUT", defaults.job_timeout),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval),
            claim_min_idle: secs("WORKER_CLAIM_MIN_IDLE_SECS", defaults.claim_min_idle),
            reschedule_delay: secs("WORKER_RESCHEDULE_DELAY_SECS", defaults.reschedule_delay),
            max_reschedules: std::env::var("WORKER_MAX_RESCHEDULES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_reschedules),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> WorkerResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WorkerError::config_error(format!("{}: invalid value '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        let labels: Vec<&str> = config.variant_labels().collect();
        assert_eq!(labels, ["480p", "720p"]);
        assert_eq!(config.thumbnail_dir, PathBuf::from("./media/thumbnails"));
        assert_eq!(config.cache_policy, CachePolicy::Full);
        config.validate().unwrap();
    }

    #[test]
    fn test_relabel_label_joins_variant_set() {
        let config = PipelineConfig {
            relabel_original_as: Some("1080p".to_string()),
            ..PipelineConfig::default()
        };
        let labels: Vec<&str> = config.variant_labels().collect();
        assert_eq!(labels, ["480p", "720p", "1080p"]);
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let config = PipelineConfig {
            relabel_original_as: Some("720p".to_string()),
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(WorkerError::ConfigError(_))));
    }

    #[test]
    fn test_stored_thumbnail_path_is_relative_under_media_root() {
        let config = PipelineConfig {
            media_root: PathBuf::from("/media"),
            thumbnail_dir: PathBuf::from("/media/thumbnails"),
            ..PipelineConfig::default()
        };
        let stored = config.stored_thumbnail_path(Path::new("/media/thumbnails/movie.jpg"));
        assert_eq!(stored, PathBuf::from("thumbnails/movie.jpg"));
        assert_eq!(
            config.resolve_stored_path(&stored),
            PathBuf::from("/media/thumbnails/movie.jpg")
        );

        let outside = config.stored_thumbnail_path(Path::new("/srv/thumbs/movie.jpg"));
        assert_eq!(outside, PathBuf::from("/srv/thumbs/movie.jpg"));
        assert_eq!(config.resolve_stored_path(&outside), outside);
    }
}
