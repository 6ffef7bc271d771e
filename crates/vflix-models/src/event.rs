//! Asset lifecycle events and record mutations.
//!
//! The record store publishes [`AssetEvent`]s when it creates or removes an
//! asset; the pipeline answers with [`AssetMutation`]s that the store applies
//! to its own records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::asset::{AssetId, DegradedReason, MediaAsset};

/// An asset record was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetCreated {
    pub id: AssetId,
    pub source_path: PathBuf,
    /// Thumbnail already attached at upload time, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
}

impl From<&MediaAsset> for AssetCreated {
    fn from(asset: &MediaAsset) -> Self {
        Self {
            id: asset.id.clone(),
            source_path: asset.source_path.clone(),
            thumbnail_path: asset.thumbnail_path.clone(),
        }
    }
}

/// An asset record is being removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetDeleted {
    pub id: AssetId,
    pub source_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
}

impl From<&MediaAsset> for AssetDeleted {
    fn from(asset: &MediaAsset) -> Self {
        Self {
            id: asset.id.clone(),
            source_path: asset.source_path.clone(),
            thumbnail_path: asset.thumbnail_path.clone(),
        }
    }
}

/// Lifecycle event published by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetEvent {
    Created(AssetCreated),
    Deleted(AssetDeleted),
}

impl AssetEvent {
    pub fn asset_id(&self) -> &AssetId {
        match self {
            AssetEvent::Created(e) => &e.id,
            AssetEvent::Deleted(e) => &e.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AssetEvent::Created(_) => "created",
            AssetEvent::Deleted(_) => "deleted",
        }
    }
}

/// Change the pipeline asks the record store to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetMutation {
    SetThumbnailPath { asset_id: AssetId, path: PathBuf },
    MarkDegraded { asset_id: AssetId, reason: DegradedReason },
}

impl AssetMutation {
    pub fn asset_id(&self) -> &AssetId {
        match self {
            AssetMutation::SetThumbnailPath { asset_id, .. } => asset_id,
            AssetMutation::MarkDegraded { asset_id, .. } => asset_id,
        }
    }

    /// Apply this mutation to an in-memory record.
    pub fn apply_to(&self, asset: &mut MediaAsset) {
        match self {
            AssetMutation::SetThumbnailPath { path, .. } => {
                asset.thumbnail_path = Some(path.clone());
            }
            AssetMutation::MarkDegraded { reason, .. } => asset.mark_degraded(*reason),
        }
    }
}
