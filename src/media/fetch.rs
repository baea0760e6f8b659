//! Media extraction via yt-dlp.
//!
//! The backend is told to prefer a combined MP4 (best MP4 video + M4A audio,
//! merged into MP4) and to print its info JSON on stdout while downloading.
//! Only the handful of fields this bot uses are parsed out of that JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::exec::{self, ExecError, ToolCommand, WorkerError, WorkerPool};
use crate::media::MediaAsset;

/// Format selection: merged MP4 first, then any MP4, then whatever is best.
pub const FORMAT_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Output file name template, relative to the workspace.
pub const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// Errors that can occur while fetching media.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("content is private or requires login: {0}")]
    AccessDenied(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("extraction finished without producing a file")]
    NoOutputProduced,

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Produces a local media file for a source URL.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` into `workspace`. The caller owns (and cleans up) the
    /// workspace; the fetcher only writes into it.
    async fn fetch(&self, url: &str, workspace: &Path) -> Result<MediaAsset, FetchError>;
}

/// The slice of yt-dlp's info JSON this bot consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExtractedInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
}

/// [`MediaFetcher`] backed by the `yt-dlp` command line tool.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: PathBuf,
    timeout: Option<Duration>,
    pool: WorkerPool,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<PathBuf>, pool: WorkerPool) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
            pool,
        }
    }

    pub fn from_config(config: &BotConfig, pool: WorkerPool) -> Self {
        Self::new(config.ytdlp_bin.clone(), pool).with_timeout(config.fetch_timeout)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for downloading `url` into `workspace`.
    pub fn command(&self, url: &str, workspace: &Path) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .arg("--output")
            .arg(workspace.join(OUTPUT_TEMPLATE))
            .args(["--format", FORMAT_SELECTOR])
            .args(["--merge-output-format", "mp4"])
            .args(["--quiet", "--no-warnings", "--no-progress"])
            .args(["--dump-json", "--no-simulate"])
            .arg("--")
            .arg(url)
            .timeout(self.timeout)
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, workspace: &Path) -> Result<MediaAsset, FetchError> {
        let command = self.command(url, workspace);
        let workspace = workspace.to_path_buf();
        self.pool
            .run("fetch", move || fetch_blocking(&command, &workspace))
            .await?
    }
}

fn fetch_blocking(command: &ToolCommand, workspace: &Path) -> Result<MediaAsset, FetchError> {
    let output = exec::run(command).map_err(|e: ExecError| FetchError::Extraction(e.to_string()))?;

    if !output.success() {
        let diagnostic = output.diagnostic();
        warn!(diagnostic = %diagnostic, "yt-dlp failed");
        return Err(classify_failure(diagnostic));
    }

    let info = parse_info(&output.stdout);
    if info.is_none() {
        debug!("yt-dlp printed no parseable metadata");
    }

    let path = resolve_output_file(workspace)
        .map_err(|e| FetchError::Extraction(format!("cannot list workspace: {e}")))?
        .ok_or(FetchError::NoOutputProduced)?;

    let title = info.and_then(|i| i.title);
    let asset = MediaAsset::from_path(&path, title)
        .map_err(|_| FetchError::NoOutputProduced)?;
    info!(
        file = %asset.file_name(),
        size_bytes = asset.size_bytes,
        container = %asset.container,
        "media downloaded"
    );
    Ok(asset)
}

/// Map a backend diagnostic onto a failure kind.
pub fn classify_failure(diagnostic: String) -> FetchError {
    if diagnostic.contains("Private") || diagnostic.to_lowercase().contains("login") {
        FetchError::AccessDenied(diagnostic)
    } else {
        FetchError::Extraction(diagnostic)
    }
}

/// First line of `stdout` that parses as an info object.
///
/// Multi-item posts print one object per item; the first one wins.
pub fn parse_info(stdout: &str) -> Option<ExtractedInfo> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<ExtractedInfo>(line).ok())
}

/// Pick the downloaded file: the first `.mp4` by name, else the first file of
/// any extension, else `None`.
pub fn resolve_output_file(workspace: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(workspace)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let is_mp4 = |p: &PathBuf| {
        p.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"))
    };
    Ok(files
        .iter()
        .find(|p| is_mp4(p))
        .or_else(|| files.first())
        .cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_command_line() {
        let fetcher = YtDlpFetcher::new("yt-dlp", WorkerPool::unbounded());
        let cmd = fetcher.command(
            "https://www.instagram.com/reel/Cx1/",
            Path::new("/tmp/ws"),
        );
        let args = cmd.arg_strings();
        assert_eq!(cmd.program_name(), "yt-dlp");
        assert_eq!(args[0], "--output");
        assert_eq!(args[1], "/tmp/ws/%(id)s.%(ext)s");
        assert!(args.windows(2).any(|w| w == ["--format", FORMAT_SELECTOR]));
        assert!(args.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(args.contains(&"--quiet".to_string()));
        assert!(args.contains(&"--no-warnings".to_string()));
        assert!(args.contains(&"--no-simulate".to_string()));
        assert_eq!(args.last().unwrap(), "https://www.instagram.com/reel/Cx1/");
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn test_classify_private() {
        let err = classify_failure("ERROR: [Instagram] Cx1: Private profile".to_string());
        assert!(matches!(err, FetchError::AccessDenied(_)));
    }

    #[test]
    fn test_classify_login_case_insensitive() {
        let err = classify_failure(
            "ERROR: Requested content is not available, LOGIN required".to_string(),
        );
        assert!(matches!(err, FetchError::AccessDenied(_)));
    }

    #[test]
    fn test_classify_generic() {
        let err = classify_failure("ERROR: Unable to extract shared data".to_string());
        assert_eq!(
            err,
            FetchError::Extraction("ERROR: Unable to extract shared data".to_string())
        );
    }

    #[test]
    fn test_parse_info_reads_typed_fields() {
        let stdout = r#"{"id": "Cx1", "title": "Video by someone", "ext": "mp4", "formats": [{"x": 1}], "duration": 12.5}"#;
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.id.as_deref(), Some("Cx1"));
        assert_eq!(info.title.as_deref(), Some("Video by someone"));
        assert_eq!(info.ext.as_deref(), Some("mp4"));
    }

    #[test]
    fn test_parse_info_skips_noise_and_takes_first() {
        let stdout = "[debug] noise\n{\"id\": \"a\", \"title\": \"first\"}\n{\"id\": \"b\", \"title\": \"second\"}\n";
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.title.as_deref(), Some("first"));
    }

    #[test]
    fn test_parse_info_none_when_missing() {
        assert_eq!(parse_info(""), None);
        assert_eq!(parse_info("{not json"), None);
    }

    #[test]
    fn test_resolve_prefers_mp4() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.webm"), b"x").unwrap();
        fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        fs::write(dir.path().join("c.mp4"), b"x").unwrap();

        let picked = resolve_output_file(dir.path()).unwrap().unwrap();
        assert_eq!(picked, dir.path().join("b.mp4"));
    }

    #[test]
    fn test_resolve_falls_back_to_any_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub.mp4")).unwrap();
        fs::write(dir.path().join("clip.mkv"), b"x").unwrap();

        let picked = resolve_output_file(dir.path()).unwrap().unwrap();
        assert_eq!(picked, dir.path().join("clip.mkv"));
    }

    #[test]
    fn test_resolve_empty_workspace() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_output_file(dir.path()).unwrap(), None);
    }

    #[cfg(unix)]
    fn fake_backend(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-yt-dlp");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_with_fake_backend() {
        let tools = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        // $2 is the output template; write the "download" next to it.
        let script = r#"dir=$(dirname "$2"); printf 'data' > "$dir/Cx1.mp4"; echo '{"id":"Cx1","title":"Beach day","ext":"mp4"}'"#;
        let fetcher = YtDlpFetcher::new(fake_backend(tools.path(), script), WorkerPool::unbounded());

        let asset = fetcher
            .fetch("https://instagram.com/p/Cx1/", workspace.path())
            .await
            .unwrap();
        assert_eq!(asset.path, workspace.path().join("Cx1.mp4"));
        assert_eq!(asset.size_bytes, 4);
        assert_eq!(asset.title.as_deref(), Some("Beach day"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_without_output() {
        let tools = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let fetcher = YtDlpFetcher::new(fake_backend(tools.path(), "exit 0"), WorkerPool::unbounded());

        let err = fetcher
            .fetch("https://instagram.com/p/Cx1/", workspace.path())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::NoOutputProduced);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_private_account() {
        let tools = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let script = "echo 'ERROR: This account is Private' >&2; exit 1";
        let fetcher = YtDlpFetcher::new(fake_backend(tools.path(), script), WorkerPool::unbounded());

        let err = fetcher
            .fetch("https://instagram.com/p/Cx1/", workspace.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::AccessDenied(_)));
    }
}
