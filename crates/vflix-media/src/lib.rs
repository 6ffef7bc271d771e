//! FFmpeg CLI wrapper for the media pipeline.
//!
//! This crate provides:
//! - Deterministic derived-artifact paths
//! - Type-safe FFmpeg command building
//! - Exit-status and output checks for every tool run
//! - Thumbnail extraction and resolution transcodes
//! - Tolerant artifact removal

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod paths;
pub mod progress;
pub mod thumbnail;
pub mod transcode;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_artifact, remove_if_exists, RemovalOutcome};
pub use paths::{derive_variant_path, PathDeriver, THUMBNAIL_EXTENSION};
pub use progress::FfmpegProgress;
pub use thumbnail::{FrameExtractor, ThumbnailExtractor};
pub use transcode::{relabel_in_place, TranscodeWorker};
