//! Reaction to deleted assets: remove the source and everything derived from it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use vflix_cache::ResponseCache;
use vflix_media::{remove_if_exists, RemovalOutcome};
use vflix_models::{AssetDeleted, AssetId};

use crate::config::PipelineConfig;
use crate::invalidation::invalidate_after;
use crate::metrics;

/// Kind of file removed, used in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Source,
    Variant,
    Thumbnail,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "source",
            ArtifactKind::Variant => "variant",
            ArtifactKind::Thumbnail => "thumbnail",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub asset_id: Option<AssetId>,
    pub removed: Vec<PathBuf>,
    /// Paths that did not exist; expected for assets whose jobs never ran
    pub missing: Vec<PathBuf>,
    /// Paths that exist but could not be removed
    pub failed: Vec<(PathBuf, String)>,
    pub cache_invalidated: bool,
}

pub struct DeletionHandler {
    config: Arc<PipelineConfig>,
    cache: Arc<dyn ResponseCache>,
}

impl DeletionHandler {
    pub fn new(config: Arc<PipelineConfig>, cache: Arc<dyn ResponseCache>) -> Self {
        Self { config, cache }
    }

    /// Every file that belongs to the deleted asset.
    ///
    /// Variants come from the same configuration ingestion uses. A source
    /// without an extension has no variants. The recorded thumbnail path wins
    /// over the derived one.
    pub fn targets(&self, event: &AssetDeleted) -> Vec<(ArtifactKind, PathBuf)> {
        let deriver = self.config.deriver();
        let source = &event.source_path;
        let mut targets = vec![(ArtifactKind::Source, source.clone())];

        match deriver.variant_paths(source, self.config.variant_labels()) {
            Ok(variants) => targets.extend(
                variants
                    .into_iter()
                    .map(|(_, path)| (ArtifactKind::Variant, path)),
            ),
            Err(e) => warn!(asset_id = %event.id, "Skipping variant cleanup: {}", e),
        }

        let thumbnail = match &event.thumbnail_path {
            Some(stored) if !stored.as_os_str().is_empty() => {
                Some(self.config.resolve_stored_path(stored))
            }
            _ => deriver.thumbnail_path(source).ok(),
        };
        if let Some(path) = thumbnail {
            targets.push((ArtifactKind::Thumbnail, path));
        }

        targets
    }

    pub async fn handle(&self, event: &AssetDeleted) -> DeletionReport {
        let mut report = DeletionReport {
            asset_id: Some(event.id.clone()),
            ..Default::default()
        };

        for (kind, path) in self.targets(event) {
            match remove_if_exists(&path).await {
                Ok(RemovalOutcome::Removed) => {
                    metrics::record_artifact_deleted(kind.as_str());
                    report.removed.push(path);
                }
                Ok(RemovalOutcome::Missing) => {
                    debug!(
                        asset_id = %event.id,
                        kind = kind.as_str(),
                        path = %path.display(),
                        "Artifact not present, skipping"
                    );
                    report.missing.push(path);
                }
                Err(e) => {
                    warn!(
                        asset_id = %event.id,
                        kind = kind.as_str(),
                        path = %path.display(),
                        "Failed to remove artifact: {}",
                        e
                    );
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        report.cache_invalidated =
            invalidate_after(self.cache.as_ref(), self.config.cache_policy, "deleted").await;

        info!(
            asset_id = %event.id,
            removed = report.removed.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Deleted asset artifacts"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;
    use vflix_cache::InMemoryResponseCache;

    fn setup(dir: &Path, relabel: Option<&str>) -> (DeletionHandler, Arc<InMemoryResponseCache>) {
        let config = PipelineConfig {
            media_root: dir.to_path_buf(),
            thumbnail_dir: dir.join("thumbnails"),
            relabel_original_as: relabel.map(str::to_string),
            ..PipelineConfig::default()
        };
        let cache = Arc::new(InMemoryResponseCache::default());
        (DeletionHandler::new(Arc::new(config), cache.clone()), cache)
    }

    async fn touch(path: &Path) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, b"data").await.unwrap();
    }

    fn deleted(source: PathBuf, thumbnail: Option<&str>) -> AssetDeleted {
        AssetDeleted {
            id: AssetId::from("a1"),
            source_path: source,
            thumbnail_path: thumbnail.map(PathBuf::from),
        }
    }

    #[tokio::test]
    async fn test_removes_every_derived_file() {
        let dir = TempDir::new().unwrap();
        let (handler, _) = setup(dir.path(), None);
        let videos = dir.path().join("videos");
        for name in ["movie.mp4", "movie_480p.mp4", "movie_720p.mp4"] {
            touch(&videos.join(name)).await;
        }
        touch(&dir.path().join("thumbnails/movie.jpg")).await;

        let report = handler
            .handle(&deleted(videos.join("movie.mp4"), Some("thumbnails/movie.jpg")))
            .await;

        assert_eq!(report.removed.len(), 4);
        assert!(report.missing.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(std::fs::read_dir(&videos).unwrap().count(), 0);
        assert!(!dir.path().join("thumbnails/movie.jpg").exists());
    }

    #[tokio::test]
    async fn test_deletion_before_transcodes_complete() {
        let dir = TempDir::new().unwrap();
        let (handler, _) = setup(dir.path(), None);
        let source = dir.path().join("videos/movie.mp4");
        touch(&source).await;
        touch(&dir.path().join("thumbnails/movie.jpg")).await;

        let report = handler
            .handle(&deleted(source.clone(), Some("thumbnails/movie.jpg")))
            .await;

        assert_eq!(
            report.removed,
            vec![source.clone(), dir.path().join("thumbnails/movie.jpg")]
        );
        assert_eq!(
            report.missing,
            vec![
                dir.path().join("videos/movie_480p.mp4"),
                dir.path().join("videos/movie_720p.mp4"),
            ]
        );
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_on_disk_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let (handler, _) = setup(dir.path(), None);

        let report = handler
            .handle(&deleted(dir.path().join("videos/movie.mp4"), None))
            .await;

        assert!(report.removed.is_empty());
        assert_eq!(report.missing.len(), 4);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_relabelled_original_is_removed() {
        let dir = TempDir::new().unwrap();
        let (handler, _) = setup(dir.path(), Some("1080p"));
        let videos = dir.path().join("videos");
        for name in ["clip_480p.mp4", "clip_720p.mp4", "clip_1080p.mp4"] {
            touch(&videos.join(name)).await;
        }

        let report = handler.handle(&deleted(videos.join("clip.mp4"), None)).await;

        assert_eq!(report.removed.len(), 3);
        assert!(report.missing.contains(&videos.join("clip.mp4")));
        assert_eq!(std::fs::read_dir(&videos).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_extensionless_source_skips_variants() {
        let dir = TempDir::new().unwrap();
        let (handler, _) = setup(dir.path(), None);
        let source = dir.path().join("videos/movie");
        touch(&source).await;
        touch(&dir.path().join("thumbnails/movie.jpg")).await;

        let targets = handler.targets(&deleted(source.clone(), None));
        assert_eq!(
            targets,
            vec![
                (ArtifactKind::Source, source.clone()),
                (ArtifactKind::Thumbnail, dir.path().join("thumbnails/movie.jpg")),
            ]
        );

        let report = handler.handle(&deleted(source, None)).await;
        assert_eq!(report.removed.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_miss_after_deletion() {
        let dir = TempDir::new().unwrap();
        let (handler, cache) = setup(dir.path(), None);
        cache.set("videos:list", b"[...]".to_vec(), None).await.unwrap();

        let report = handler
            .handle(&deleted(dir.path().join("videos/movie.mp4"), None))
            .await;

        assert!(report.cache_invalidated);
        assert_eq!(cache.get("videos:list").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_cache_clear_still_removes_files() {
        let dir = TempDir::new().unwrap();
        let (handler, cache) = setup(dir.path(), None);
        let source = dir.path().join("videos/movie.mp4");
        touch(&source).await;
        cache.set("videos:list", b"[movie]".to_vec(), None).await.unwrap();
        cache.fail_next_clears(1);

        let report = handler.handle(&deleted(source.clone(), None)).await;

        assert!(!report.cache_invalidated);
        assert_eq!(report.removed, vec![source.clone()]);
        assert!(!source.exists());
    }
}
