//! Artifact lookup for listing and detail views.
//!
//! An asset may lack any of its derived files for a while after creation.
//! Resolution reports each file as present or absent and never fails.

use std::path::{Path, PathBuf};

use serde::Serialize;
use vflix_models::{AssetId, MediaAsset};

use crate::config::PipelineConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantArtifact {
    pub label: String,
    pub path: Option<PathBuf>,
}

/// Files of one asset that currently exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    pub asset_id: AssetId,
    pub source: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
    pub variants: Vec<VariantArtifact>,
}

impl ArtifactSet {
    pub async fn resolve(asset: &MediaAsset, config: &PipelineConfig) -> Self {
        let deriver = config.deriver();
        let source = asset.source_path();

        let thumbnail = match &asset.thumbnail_path {
            Some(stored) if asset.has_thumbnail() => Some(config.resolve_stored_path(stored)),
            _ => None,
        };

        let mut variants = Vec::new();
        for label in config.variant_labels() {
            let path = match deriver.variant_path(source, label) {
                Ok(path) => existing(path).await,
                Err(_) => None,
            };
            variants.push(VariantArtifact {
                label: label.to_string(),
                path,
            });
        }

        Self {
            asset_id: asset.id.clone(),
            source: existing(source.to_path_buf()).await,
            thumbnail: match thumbnail {
                Some(path) => existing(path).await,
                None => None,
            },
            variants,
        }
    }

    pub fn variant(&self, label: &str) -> Option<&Path> {
        self.variants
            .iter()
            .find(|v| v.label == label)
            .and_then(|v| v.path.as_deref())
    }

    /// Whether every configured variant exists.
    pub fn is_complete(&self) -> bool {
        self.variants.iter().all(|v| v.path.is_some())
    }
}

async fn existing(path: PathBuf) -> Option<PathBuf> {
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(path),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vflix_models::AssetCategory;

    #[tokio::test]
    async fn test_partial_pipeline_resolves_to_nones() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            media_root: dir.path().to_path_buf(),
            thumbnail_dir: dir.path().join("thumbnails"),
            ..PipelineConfig::default()
        };
        let videos = dir.path().join("videos");
        tokio::fs::create_dir_all(&videos).await.unwrap();
        tokio::fs::write(videos.join("movie.mp4"), b"src").await.unwrap();
        tokio::fs::write(videos.join("movie_720p.mp4"), b"720").await.unwrap();

        let asset = MediaAsset::new(videos.join("movie.mp4"), AssetCategory::Holiday)
            .with_thumbnail("thumbnails/movie.jpg");
        let set = ArtifactSet::resolve(&asset, &config).await;

        assert_eq!(set.source, Some(videos.join("movie.mp4")));
        assert_eq!(set.thumbnail, None);
        assert_eq!(set.variant("480p"), None);
        assert_eq!(set.variant("720p"), Some(videos.join("movie_720p.mp4").as_path()));
        assert!(!set.is_complete());
    }

    #[tokio::test]
    async fn test_extensionless_source_has_no_variants() {
        let config = PipelineConfig::default();
        let asset = MediaAsset::new("/nowhere/movie", AssetCategory::Fitness);
        let set = ArtifactSet::resolve(&asset, &config).await;

        assert_eq!(set.source, None);
        assert!(set.variants.iter().all(|v| v.path.is_none()));
        assert_eq!(set.variants.len(), 2);
    }
}
