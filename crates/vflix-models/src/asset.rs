//! Media asset models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an uploaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    /// Generate a new random asset ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Category label attached to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    #[default]
    Fitness,
    Chess,
    Pets,
    Holiday,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Fitness => "fitness",
            AssetCategory::Chess => "chess",
            AssetCategory::Pets => "pets",
            AssetCategory::Holiday => "holiday",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fitness" => Ok(AssetCategory::Fitness),
            "chess" => Ok(AssetCategory::Chess),
            "pets" => Ok(AssetCategory::Pets),
            "holiday" => Ok(AssetCategory::Holiday),
            other => Err(format!("unknown asset category: {}", other)),
        }
    }
}

/// Why an asset is missing some of its derived artifacts.
///
/// The record itself always exists; these flags tell listing views and
/// operators that the pipeline did not complete for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Frame extraction failed; the asset has no thumbnail.
    ThumbnailFailed,
    /// Transcode jobs could not be handed to the queue.
    PendingTranscode,
    /// The source path has no derivable extension.
    InvalidSourcePath,
}

impl DegradedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedReason::ThumbnailFailed => "thumbnail_failed",
            DegradedReason::PendingTranscode => "pending_transcode",
            DegradedReason::InvalidSourcePath => "invalid_source_path",
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One uploaded source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaAsset {
    /// Unique asset ID
    pub id: AssetId,

    /// Absolute path of the uploaded source file
    pub source_path: PathBuf,

    /// Category label
    #[serde(default)]
    pub category: AssetCategory,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Thumbnail path, relative to the media root when possible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,

    /// Degraded-state flags raised by the pipeline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<DegradedReason>,
}

impl MediaAsset {
    /// Create a new asset record for an uploaded file.
    pub fn new(source_path: impl Into<PathBuf>, category: AssetCategory) -> Self {
        Self {
            id: AssetId::new(),
            source_path: source_path.into(),
            category,
            created_at: Utc::now(),
            thumbnail_path: None,
            degraded: Vec::new(),
        }
    }

    /// Set the asset ID.
    pub fn with_id(mut self, id: impl Into<AssetId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the thumbnail path.
    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail_path = Some(path.into());
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Whether a thumbnail path has been recorded.
    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }

    /// Raise a degraded-state flag. Flags are recorded once.
    pub fn mark_degraded(&mut self, reason: DegradedReason) {
        if !self.degraded.contains(&reason) {
            self.degraded.push(reason);
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_asset_has_no_thumbnail() {
        let asset = MediaAsset::new("/media/videos/movie.mp4", AssetCategory::Pets);
        assert!(!asset.has_thumbnail());
        assert!(!asset.is_degraded());
        assert_eq!(asset.category, AssetCategory::Pets);
    }

    #[test]
    fn test_empty_thumbnail_path_is_absent() {
        let asset = MediaAsset::new("/media/videos/movie.mp4", AssetCategory::Chess).with_thumbnail("");
        assert!(!asset.has_thumbnail());
    }

    #[test]
    fn test_mark_degraded_is_deduplicated() {
        let mut asset = MediaAsset::new("/media/videos/movie.mp4", AssetCategory::Fitness);
        asset.mark_degraded(DegradedReason::PendingTranscode);
        asset.mark_degraded(DegradedReason::PendingTranscode);
        assert_eq!(asset.degraded, vec![DegradedReason::PendingTranscode]);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Holiday".parse::<AssetCategory>().unwrap(), AssetCategory::Holiday);
        assert!("cooking".parse::<AssetCategory>().is_err());
    }

    #[test]
    fn test_asset_serialization_skips_empty_fields() {
        let asset = MediaAsset::new("/media/videos/movie.mp4", AssetCategory::Fitness).with_id("a1");
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["id"], "a1");
        assert_eq!(json["category"], "fitness");
        assert!(json.get("thumbnail_path").is_none());
        assert!(json.get("degraded").is_none());
    }
}
