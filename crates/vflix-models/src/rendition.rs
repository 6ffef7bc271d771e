//! Resolution targets and thumbnail settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timestamp::format_seconds;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;

/// Thumbnail generation defaults
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 640;
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 360;
pub const DEFAULT_THUMBNAIL_OFFSET_SECS: f64 = 0.0;

/// Known resolution labels and their frame sizes.
const PRESETS: &[(&str, u32, u32)] = &[
    ("120p", 160, 120),
    ("240p", 426, 240),
    ("360p", 640, 360),
    ("480p", 852, 480),
    ("720p", 1280, 720),
    ("1080p", 1920, 1080),
];

/// Errors raised while parsing a rendition entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenditionParseError {
    #[error("Empty rendition entry")]
    Empty,

    #[error("Unknown rendition label without dimensions: {0}")]
    UnknownLabel(String),

    #[error("Invalid dimensions '{0}', expected WIDTHxHEIGHT")]
    InvalidDimensions(String),

    #[error("Invalid CRF value: {0}")]
    InvalidCrf(String),

    #[error("Invalid label '{0}': labels may not contain path separators")]
    InvalidLabel(String),
}

/// One resolution variant: a label bound to encoder parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResolutionTarget {
    /// Variant label used in derived file names (e.g. "720p")
    pub label: String,

    /// Target frame width in pixels
    pub width: u32,

    /// Target frame height in pixels
    pub height: u32,

    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}

impl ResolutionTarget {
    /// Create a target with default codec settings.
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            video_codec: default_video_codec(),
            crf: DEFAULT_CRF,
            audio_codec: default_audio_codec(),
            extra_args: Vec::new(),
        }
    }

    /// Look up a known label ("480p", "720p", ...).
    pub fn preset(label: &str) -> Option<Self> {
        PRESETS
            .iter()
            .find(|(name, _, _)| *name == label)
            .map(|(name, w, h)| Self::new(*name, *w, *h))
    }

    /// Set the video codec.
    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    /// Set the CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Set the audio codec.
    pub fn with_audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    /// Frame size as passed to `-s`.
    pub fn dimensions(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Encoder arguments placed between the input and the output path.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            self.dimensions(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Parse one rendition entry.
    ///
    /// Accepted forms:
    /// - `720p` (known preset)
    /// - `720p=1280x720`
    /// - `720p=1280x720:libx265:28:opus`
    pub fn parse(entry: &str) -> Result<Self, RenditionParseError> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(RenditionParseError::Empty);
        }

        let Some((label, rest)) = entry.split_once('=') else {
            validate_label(entry)?;
            return Self::preset(entry)
                .ok_or_else(|| RenditionParseError::UnknownLabel(entry.to_string()));
        };

        let label = label.trim();
        if label.is_empty() {
            return Err(RenditionParseError::Empty);
        }
        validate_label(label)?;

        let mut parts = rest.split(':').map(str::trim);
        let dims = parts.next().unwrap_or_default();
        let (width, height) = parse_dimensions(dims)?;
        let mut target = Self::new(label, width, height);

        if let Some(codec) = parts.next().filter(|s| !s.is_empty()) {
            target.video_codec = codec.to_string();
        }
        if let Some(crf) = parts.next().filter(|s| !s.is_empty()) {
            target.crf = crf
                .parse::<u8>()
                .ok()
                .filter(|v| *v <= 51)
                .ok_or_else(|| RenditionParseError::InvalidCrf(crf.to_string()))?;
        }
        if let Some(audio) = parts.next().filter(|s| !s.is_empty()) {
            target.audio_codec = audio.to_string();
        }

        Ok(target)
    }

    /// Parse a comma-separated list of entries, preserving order.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, RenditionParseError> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

fn validate_label(label: &str) -> Result<(), RenditionParseError> {
    if label.contains('/') || label.contains('\\') {
        return Err(RenditionParseError::InvalidLabel(label.to_string()));
    }
    Ok(())
}

fn parse_dimensions(dims: &str) -> Result<(u32, u32), RenditionParseError> {
    let invalid = || RenditionParseError::InvalidDimensions(dims.to_string());
    let (w, h) = dims.split_once('x').ok_or_else(invalid)?;
    let width: u32 = w.trim().parse().map_err(|_| invalid())?;
    let height: u32 = h.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

/// Where and how large the still frame is captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThumbnailSpec {
    /// Capture offset in seconds from the start of the source
    pub offset_secs: f64,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            offset_secs: DEFAULT_THUMBNAIL_OFFSET_SECS,
            width: DEFAULT_THUMBNAIL_WIDTH,
            height: DEFAULT_THUMBNAIL_HEIGHT,
        }
    }
}

impl ThumbnailSpec {
    /// Capture offset formatted as `HH:MM:SS`.
    pub fn offset_timestamp(&self) -> String {
        format_seconds(self.offset_secs)
    }

    /// Scale filter for the captured frame.
    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let hd = ResolutionTarget::preset("720p").unwrap();
        assert_eq!(hd.dimensions(), "1280x720");
        assert_eq!(hd.video_codec, "libx264");
        assert_eq!(hd.crf, 23);
        assert!(ResolutionTarget::preset("999p").is_none());
    }

    #[test]
    fn test_ffmpeg_args_order() {
        let args = ResolutionTarget::preset("480p").unwrap().to_ffmpeg_args();
        assert_eq!(
            args,
            vec!["-s", "852x480", "-c:v", "libx264", "-crf", "23", "-c:a", "aac"]
        );
    }

    #[test]
    fn test_parse_full_entry() {
        let target = ResolutionTarget::parse("540p=960x540:libx265:28:opus").unwrap();
        assert_eq!(target.label, "540p");
        assert_eq!((target.width, target.height), (960, 540));
        assert_eq!(target.video_codec, "libx265");
        assert_eq!(target.crf, 28);
        assert_eq!(target.audio_codec, "opus");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ResolutionTarget::parse(" "), Err(RenditionParseError::Empty));
        assert!(matches!(
            ResolutionTarget::parse("555p"),
            Err(RenditionParseError::UnknownLabel(_))
        ));
        assert!(matches!(
            ResolutionTarget::parse("x=12by3"),
            Err(RenditionParseError::InvalidDimensions(_))
        ));
        assert!(matches!(
            ResolutionTarget::parse("x=10x10:libx264:99"),
            Err(RenditionParseError::InvalidCrf(_))
        ));
        assert!(matches!(
            ResolutionTarget::parse("../x=10x10"),
            Err(RenditionParseError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_parse_list_preserves_order() {
        let targets = ResolutionTarget::parse_list("720p, 360p,120p").unwrap();
        let labels: Vec<_> = targets.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["720p", "360p", "120p"]);
    }

    #[test]
    fn test_thumbnail_spec_defaults() {
        let spec = ThumbnailSpec::default();
        assert_eq!(spec.offset_timestamp(), "00:00:00");
        assert_eq!(spec.scale_filter(), "scale=640:360");
    }
}
