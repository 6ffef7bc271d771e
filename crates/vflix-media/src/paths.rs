//! Derived artifact paths.
//!
//! Every derived file is addressed by `(source path, variant label)` alone, so
//! ingestion, retries and deletion all compute the same location without a
//! lookup table.
//!
//! - Resolution variant: `<dir>/<stem>_<label><ext>` next to the source
//!   (`clip.mp4` + `720p` -> `clip_720p.mp4`).
//! - Thumbnail: `<thumbnail_dir>/<stem>.jpg`.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Extension of extracted thumbnails.
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Computes derived artifact paths for a fixed thumbnail directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDeriver {
    thumbnail_dir: PathBuf,
}

impl PathDeriver {
    /// Create a deriver writing thumbnails into `thumbnail_dir`.
    pub fn new(thumbnail_dir: impl Into<PathBuf>) -> Self {
        Self {
            thumbnail_dir: thumbnail_dir.into(),
        }
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.thumbnail_dir
    }

    /// Path of the resolution variant `label` of `source`.
    pub fn variant_path(&self, source: &Path, label: &str) -> MediaResult<PathBuf> {
        derive_variant_path(source, label)
    }

    /// Path of the thumbnail of `source`.
    pub fn thumbnail_path(&self, source: &Path) -> MediaResult<PathBuf> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MediaError::invalid_path(format!("no file name in {}", source.display()))
            })?;
        Ok(self
            .thumbnail_dir
            .join(format!("{}.{}", stem, THUMBNAIL_EXTENSION)))
    }

    /// Paths of every variant in `labels`, in order.
    pub fn variant_paths<'a, I>(&self, source: &Path, labels: I) -> MediaResult<Vec<(String, PathBuf)>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        labels
            .into_iter()
            .map(|label| Ok((label.to_string(), self.variant_path(source, label)?)))
            .collect()
    }
}

/// Insert `_<label>` between the file stem and the extension of `source`.
///
/// Fails with [`MediaError::InvalidPath`] when the file name carries no
/// extension to preserve (`movie`, `.hidden`, `movie.`) or is not UTF-8.
pub fn derive_variant_path(source: &Path, label: &str) -> MediaResult<PathBuf> {
    if label.is_empty() || label.contains(['/', '\\']) {
        return Err(MediaError::invalid_path(format!(
            "invalid variant label '{}'",
            label
        )));
    }

    let (base, ext) = split_extension(source)?;
    Ok(source.with_file_name(format!("{}_{}{}", base, label, ext)))
}

/// Split a file name at its last `.` into `(stem, ".ext")`.
fn split_extension(source: &Path) -> MediaResult<(&str, &str)> {
    let file_name = source
        .file_name()
        .ok_or_else(|| MediaError::invalid_path(format!("no file name in {}", source.display())))?
        .to_str()
        .ok_or_else(|| {
            MediaError::invalid_path(format!("non UTF-8 file name in {}", source.display()))
        })?;

    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => {
            Ok((&file_name[..idx], &file_name[idx..]))
        }
        _ => Err(MediaError::invalid_path(format!(
            "no extension in {}",
            source.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_path_keeps_directory_and_extension() {
        let out = derive_variant_path(Path::new("/media/videos/clip.mp4"), "720p").unwrap();
        assert_eq!(out, PathBuf::from("/media/videos/clip_720p.mp4"));
    }

    #[test]
    fn test_variant_path_relative_source() {
        let out = derive_variant_path(Path::new("clip.mp4"), "720p").unwrap();
        assert_eq!(out, PathBuf::from("clip_720p.mp4"));
    }

    #[test]
    fn test_variant_path_uses_last_dot() {
        let out = derive_variant_path(Path::new("/m/v1.2/my.clip.webm"), "480p").unwrap();
        assert_eq!(out, PathBuf::from("/m/v1.2/my.clip_480p.webm"));
    }

    #[test]
    fn test_variant_path_is_deterministic() {
        let source = Path::new("/media/videos/movie.mp4");
        let first = derive_variant_path(source, "480p").unwrap();
        let second = derive_variant_path(source, "480p").unwrap();
        assert_eq!(first, second);
        assert!(first.to_str().unwrap().ends_with("_480p.mp4"));
    }

    #[test]
    fn test_variant_path_rejects_missing_extension() {
        for bad in ["/media/videos/movie", "/media/videos/.hidden", "/media/videos/movie.", "/"] {
            let err = derive_variant_path(Path::new(bad), "720p").unwrap_err();
            assert!(matches!(err, MediaError::InvalidPath(_)), "{}", bad);
        }
    }

    #[test]
    fn test_variant_path_rejects_bad_label() {
        assert!(derive_variant_path(Path::new("a.mp4"), "").is_err());
        assert!(derive_variant_path(Path::new("a.mp4"), "../x").is_err());
    }

    #[test]
    fn test_thumbnail_path() {
        let deriver = PathDeriver::new("/media/thumbnails");
        let out = deriver.thumbnail_path(Path::new("/media/videos/movie.mp4")).unwrap();
        assert_eq!(out, PathBuf::from("/media/thumbnails/movie.jpg"));
    }

    #[test]
    fn test_thumbnail_path_without_extension() {
        let deriver = PathDeriver::new("/media/thumbnails");
        let out = deriver.thumbnail_path(Path::new("/media/videos/movie")).unwrap();
        assert_eq!(out, PathBuf::from("/media/thumbnails/movie.jpg"));
    }

    #[test]
    fn test_variant_paths_in_order() {
        let deriver = PathDeriver::new("/media/thumbnails");
        let paths = deriver
            .variant_paths(Path::new("/media/videos/movie.mp4"), ["480p", "720p"])
            .unwrap();
        assert_eq!(
            paths,
            vec![
                ("480p".to_string(), PathBuf::from("/media/videos/movie_480p.mp4")),
                ("720p".to_string(), PathBuf::from("/media/videos/movie_720p.mp4")),
            ]
        );
    }
}
