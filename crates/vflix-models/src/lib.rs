//! Shared data models for the Videoflix media pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media assets and their degraded-state flags
//! - Resolution targets and thumbnail settings
//! - Asset lifecycle events and record mutations
//! - Job identifiers and job states

pub mod asset;
pub mod event;
pub mod job;
pub mod rendition;
pub mod timestamp;

// Re-export common types
pub use asset::{AssetCategory, AssetId, DegradedReason, MediaAsset};
pub use event::{AssetCreated, AssetDeleted, AssetEvent, AssetMutation};
pub use job::{JobId, JobState};
pub use rendition::{RenditionParseError, ResolutionTarget, ThumbnailSpec};
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
