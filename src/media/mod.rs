//! Media pipeline module
//!
//! Turns a post link into a deliverable video file:
//!
//! - **fetch**: runs the extraction backend (yt-dlp) into a request
//!   workspace and adapts its output into a [`MediaAsset`]
//! - **transcode**: two-pass, bitrate-targeted re-encode via ffprobe/ffmpeg
//!   so an oversized video fits a size ceiling
//!
//! # Example
//!
//! ```ignore
//! use reelgrab::media::{MediaFetcher, YtDlpFetcher};
//!
//! let fetcher = YtDlpFetcher::from_config(&config, pool);
//! let asset = fetcher.fetch("https://www.instagram.com/reel/Cx1/", workspace).await?;
//! println!("{} ({:.1} MB)", asset.path.display(), asset.size_mb());
//! ```

pub mod fetch;
pub mod transcode;

use std::io;
use std::path::{Path, PathBuf};

pub use fetch::{FetchError, MediaFetcher, YtDlpFetcher};
pub use transcode::{
    EncodePass, FfmpegTranscoder, TranscodeError, TranscodeTarget, Transcoder,
    AUDIO_BITRATE_KBPS, DEFAULT_TARGET_MB, MIN_VIDEO_BITRATE_KBPS,
};

/// Maximum caption length accepted for videos and documents.
pub const MAX_CAPTION_CHARS: usize = 1024;

const CAPTION_ELLIPSIS: &str = "...";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// A media file on disk inside a request workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub title: Option<String>,
    /// Lowercased file extension, e.g. `mp4`.
    pub container: String,
}

impl MediaAsset {
    /// Describe the file at `path`, reading its size from disk.
    pub fn from_path(path: impl Into<PathBuf>, title: Option<String>) -> io::Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let container = container_of(&path);
        Ok(Self {
            path,
            size_bytes: metadata.len(),
            title,
            container,
        })
    }

    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size_bytes)
    }

    /// File name used for document uploads.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string())
    }

    pub fn caption(&self) -> Option<String> {
        self.title.as_deref().and_then(truncate_caption)
    }
}

/// Caption for `title`, capped at [`MAX_CAPTION_CHARS`]. Empty titles yield no caption.
pub fn truncate_caption(title: &str) -> Option<String> {
    if title.is_empty() {
        return None;
    }
    if title.chars().count() <= MAX_CAPTION_CHARS {
        return Some(title.to_string());
    }
    let keep = MAX_CAPTION_CHARS - CAPTION_ELLIPSIS.len();
    let mut caption: String = title.chars().take(keep).collect();
    caption.push_str(CAPTION_ELLIPSIS);
    Some(caption)
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB as f64
}

pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(BYTES_PER_MB)
}

fn container_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_caption_short_title_unchanged() {
        assert_eq!(truncate_caption("Sunset reel"), Some("Sunset reel".to_string()));
    }

    #[test]
    fn test_truncate_caption_empty_is_none() {
        assert_eq!(truncate_caption(""), None);
    }

    #[test]
    fn test_truncate_caption_exact_limit_unchanged() {
        let title = "a".repeat(MAX_CAPTION_CHARS);
        assert_eq!(truncate_caption(&title), Some(title));
    }

    #[test]
    fn test_truncate_caption_long_title() {
        let title = "b".repeat(MAX_CAPTION_CHARS + 500);
        let caption = truncate_caption(&title).unwrap();
        assert_eq!(caption.chars().count(), 1024);
        assert!(caption.ends_with("..."));
        assert_eq!(&caption[..1021], &title[..1021]);
    }

    #[test]
    fn test_truncate_caption_counts_characters_not_bytes() {
        let title = "й".repeat(2000);
        let caption = truncate_caption(&title).unwrap();
        assert_eq!(caption.chars().count(), 1024);
        assert!(caption.starts_with("йй"));
    }

    #[test]
    fn test_media_asset_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cx1.MP4");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let asset = MediaAsset::from_path(&path, Some("title".to_string())).unwrap();
        assert_eq!(asset.size_bytes, 2048);
        assert_eq!(asset.container, "mp4");
        assert_eq!(asset.file_name(), "Cx1.MP4");
        assert_eq!(asset.caption().as_deref(), Some("title"));
    }

    #[test]
    fn test_media_asset_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = MediaAsset::from_path(dir.path().join("missing.mp4"), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_media_asset_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = MediaAsset::from_path(dir.path(), None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mb_conversions() {
        assert_eq!(mb_to_bytes(50), 52_428_800);
        assert!((bytes_to_mb(52_428_800) - 50.0).abs() < f64::EPSILON);
        assert_eq!(mb_to_bytes(u64::MAX), u64::MAX);
    }
}
