//! Bitrate-targeted re-encoding.
//!
//! Given a duration and a size ceiling, the average bitrate that fills the
//! ceiling is fixed by arithmetic. A two-pass libx264 encode then spends
//! that average unevenly across the timeline (more on motion, less on
//! static shots) instead of starving busy scenes the way a single
//! constant-bitrate pass would.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::BotConfig;
use crate::exec::{self, ToolCommand, WorkerError, WorkerPool};

/// Default size target in megabytes, just under the 50 MB inline ceiling.
pub const DEFAULT_TARGET_MB: u64 = 49;

/// Audio is always re-encoded at this bitrate.
pub const AUDIO_BITRATE_KBPS: i64 = 128;

/// Below this video bitrate the result is not worth producing.
pub const MIN_VIDEO_BITRATE_KBPS: i64 = 100;

/// Prefix of the pass-1 statistics files, created next to the output.
const PASS_LOG_PREFIX: &str = "ffmpeg2pass";

#[cfg(unix)]
const NULL_SINK: &str = "/dev/null";
#[cfg(windows)]
const NULL_SINK: &str = "NUL";

/// Which encoder pass failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePass {
    First,
    Second,
}

impl fmt::Display for EncodePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodePass::First => write!(f, "pass 1"),
            EncodePass::Second => write!(f, "pass 2"),
        }
    }
}

/// Errors that can occur during compression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("could not determine duration: {0}")]
    ProbeFailure(String),

    #[error("target video bitrate {video_kbps} kbps is below {MIN_VIDEO_BITRATE_KBPS} kbps")]
    BitrateTooLow { video_kbps: i64 },

    #[error("encoder {pass} failed: {diagnostic}")]
    PassFailed { pass: EncodePass, diagnostic: String },

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Bitrates for one compression attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeTarget {
    pub target_mb: u64,
    pub audio_kbps: i64,
    pub video_kbps: i64,
}

impl TranscodeTarget {
    /// Work out the video bitrate that fits `duration_secs` into `target_mb`.
    pub fn plan(duration_secs: f64, target_mb: u64) -> Result<Self, TranscodeError> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(TranscodeError::ProbeFailure(format!(
                "unusable duration {duration_secs}"
            )));
        }

        let budget_kbits = target_mb.saturating_mul(8 * 1024) as f64;
        let video_kbps = (budget_kbits / duration_secs).floor() as i64 - AUDIO_BITRATE_KBPS;
        if video_kbps < MIN_VIDEO_BITRATE_KBPS {
            return Err(TranscodeError::BitrateTooLow { video_kbps });
        }

        Ok(Self {
            target_mb,
            audio_kbps: AUDIO_BITRATE_KBPS,
            video_kbps,
        })
    }
}

/// Re-encodes a video to fit a size ceiling.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Whether the encoder backend is installed.
    fn is_available(&self) -> bool;

    /// Encode `source` into `output`, aiming for `target_mb`. On error no
    /// usable file is left at `output`.
    async fn compress(
        &self,
        source: &Path,
        output: &Path,
        target_mb: u64,
    ) -> Result<(), TranscodeError>;
}

/// [`Transcoder`] backed by the `ffprobe` and `ffmpeg` command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Option<Duration>,
    pool: WorkerPool,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>, pool: WorkerPool) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout: None,
            pool,
        }
    }

    pub fn from_config(config: &BotConfig, pool: WorkerPool) -> Self {
        Self::new(config.ffmpeg_bin.clone(), config.ffprobe_bin.clone(), pool)
            .with_timeout(config.transcode_timeout)
    }

    /// Deadline applied to each tool invocation separately.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn probe_command(&self, source: &Path) -> ToolCommand {
        ToolCommand::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(source)
            .timeout(self.timeout)
    }

    pub fn first_pass_command(
        &self,
        source: &Path,
        target: &TranscodeTarget,
        pass_log: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg)
            .args(["-y", "-i"])
            .arg(source)
            .args(["-c:v", "libx264", "-b:v"])
            .arg(format!("{}k", target.video_kbps))
            .args(["-pass", "1", "-passlogfile"])
            .arg(pass_log)
            .args(["-an", "-f", "null", NULL_SINK])
            .timeout(self.timeout)
    }

    pub fn second_pass_command(
        &self,
        source: &Path,
        output: &Path,
        target: &TranscodeTarget,
        pass_log: &Path,
    ) -> ToolCommand {
        ToolCommand::new(&self.ffmpeg)
            .args(["-y", "-i"])
            .arg(source)
            .args(["-c:v", "libx264", "-b:v"])
            .arg(format!("{}k", target.video_kbps))
            .args(["-pass", "2", "-passlogfile"])
            .arg(pass_log)
            .args(["-c:a", "aac", "-b:a"])
            .arg(format!("{}k", target.audio_kbps))
            .arg(output)
            .timeout(self.timeout)
    }

    fn compress_blocking(
        &self,
        source: &Path,
        output: &Path,
        target_mb: u64,
    ) -> Result<(), TranscodeError> {
        let duration = self.probe_duration(source)?;
        let target = match TranscodeTarget::plan(duration, target_mb) {
            Ok(target) => target,
            Err(e) => {
                warn!(duration_secs = duration, target_mb, error = %e, "compression infeasible");
                return Err(e);
            }
        };
        info!(
            duration_secs = duration,
            video_kbps = target.video_kbps,
            audio_kbps = target.audio_kbps,
            "starting two-pass encode"
        );

        let pass_log = output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(PASS_LOG_PREFIX);

        self.run_pass(
            EncodePass::First,
            &self.first_pass_command(source, &target, &pass_log),
            output,
        )?;
        self.run_pass(
            EncodePass::Second,
            &self.second_pass_command(source, output, &target, &pass_log),
            output,
        )
    }

    fn probe_duration(&self, source: &Path) -> Result<f64, TranscodeError> {
        let output = exec::run(&self.probe_command(source))
            .map_err(|e| TranscodeError::ProbeFailure(e.to_string()))?;
        if !output.success() {
            error!(diagnostic = %output.diagnostic(), "ffprobe failed");
            return Err(TranscodeError::ProbeFailure(output.diagnostic()));
        }
        parse_duration(&output.stdout).inspect_err(|e| {
            error!(error = %e, "ffprobe could not determine duration");
        })
    }

    fn run_pass(
        &self,
        pass: EncodePass,
        command: &ToolCommand,
        output: &Path,
    ) -> Result<(), TranscodeError> {
        let diagnostic = match exec::run(command) {
            Ok(result) if result.success() => return Ok(()),
            Ok(result) => result.diagnostic(),
            Err(e) => e.to_string(),
        };
        error!(%pass, diagnostic = %diagnostic, "ffmpeg pass failed");
        if output.exists() {
            let _ = std::fs::remove_file(output);
        }
        Err(TranscodeError::PassFailed { pass, diagnostic })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn is_available(&self) -> bool {
        which::which(&self.ffmpeg).is_ok()
    }

    async fn compress(
        &self,
        source: &Path,
        output: &Path,
        target_mb: u64,
    ) -> Result<(), TranscodeError> {
        let this = self.clone();
        let source = source.to_path_buf();
        let output = output.to_path_buf();
        self.pool
            .run("transcode", move || {
                this.compress_blocking(&source, &output, target_mb)
            })
            .await?
    }
}

/// Parse ffprobe's bare `format=duration` output.
pub fn parse_duration(stdout: &str) -> Result<f64, TranscodeError> {
    let raw = stdout.trim();
    let duration: f64 = raw
        .parse()
        .map_err(|_| TranscodeError::ProbeFailure(format!("unparseable duration {raw:?}")))?;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(TranscodeError::ProbeFailure(format!(
            "unusable duration {raw:?}"
        )));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder() -> FfmpegTranscoder {
        FfmpegTranscoder::new("ffmpeg", "ffprobe", WorkerPool::unbounded())
    }

    #[test]
    fn test_plan_short_clip() {
        // 49 MB over one minute: floor(401408 / 60) - 128
        let target = TranscodeTarget::plan(60.0, 49).unwrap();
        assert_eq!(target.video_kbps, 6562);
        assert_eq!(target.audio_kbps, 128);
        assert_eq!(target.target_mb, 49);
    }

    #[test]
    fn test_plan_floor_is_applied_before_audio() {
        // 401408 / 7 = 57344.0, exactly
        let target = TranscodeTarget::plan(7.0, 49).unwrap();
        assert_eq!(target.video_kbps, 57344 - 128);
        // 401408 / 3 = 133802.67 -> 133802
        let target = TranscodeTarget::plan(3.0, 49).unwrap();
        assert_eq!(target.video_kbps, 133802 - 128);
    }

    #[test]
    fn test_plan_two_hours_at_one_mb_is_infeasible() {
        let err = TranscodeTarget::plan(7200.0, 1).unwrap_err();
        // floor(8192 / 7200) - 128 = -127
        assert_eq!(err, TranscodeError::BitrateTooLow { video_kbps: -127 });
    }

    #[test]
    fn test_plan_two_hours_at_default_target_is_infeasible() {
        // floor(401408 / 7200) - 128 = -73
        let err = TranscodeTarget::plan(7200.0, DEFAULT_TARGET_MB).unwrap_err();
        assert_eq!(err, TranscodeError::BitrateTooLow { video_kbps: -73 });
    }

    #[test]
    fn test_plan_boundary_at_minimum_bitrate() {
        // 401408 / 1760 = 228.07 -> video 100, accepted
        let ok = TranscodeTarget::plan(1760.0, 49).unwrap();
        assert_eq!(ok.video_kbps, 100);
        // 401408 / 1765 = 227.42 -> video 99, rejected
        let err = TranscodeTarget::plan(1765.0, 49).unwrap_err();
        assert_eq!(err, TranscodeError::BitrateTooLow { video_kbps: 99 });
    }

    #[test]
    fn test_plan_huge_target_does_not_overflow() {
        let target = TranscodeTarget::plan(60.0, 3_000_000_000_000_000).unwrap();
        assert!(target.video_kbps > MIN_VIDEO_BITRATE_KBPS);
        let target = TranscodeTarget::plan(60.0, u64::MAX).unwrap();
        assert!(target.video_kbps > MIN_VIDEO_BITRATE_KBPS);
    }

    #[test]
    fn test_plan_rejects_unusable_duration() {
        assert!(matches!(
            TranscodeTarget::plan(0.0, 49),
            Err(TranscodeError::ProbeFailure(_))
        ));
        assert!(matches!(
            TranscodeTarget::plan(f64::NAN, 49),
            Err(TranscodeError::ProbeFailure(_))
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.345000\n").unwrap(), 12.345);
        assert!(matches!(
            parse_duration("N/A"),
            Err(TranscodeError::ProbeFailure(_))
        ));
        assert!(matches!(
            parse_duration(""),
            Err(TranscodeError::ProbeFailure(_))
        ));
        assert!(matches!(
            parse_duration("-1"),
            Err(TranscodeError::ProbeFailure(_))
        ));
    }

    #[test]
    fn test_probe_command() {
        let cmd = transcoder().probe_command(Path::new("/ws/in.mp4"));
        assert_eq!(cmd.program_name(), "ffprobe");
        assert_eq!(
            cmd.arg_strings(),
            vec![
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                "/ws/in.mp4"
            ]
        );
    }

    #[test]
    fn test_first_pass_writes_no_media() {
        let target = TranscodeTarget::plan(60.0, 49).unwrap();
        let cmd = transcoder().first_pass_command(
            Path::new("/ws/in.mp4"),
            &target,
            Path::new("/ws/ffmpeg2pass"),
        );
        let args = cmd.arg_strings();
        assert!(args.windows(2).any(|w| w == ["-b:v", "6562k"]));
        assert!(args.windows(2).any(|w| w == ["-pass", "1"]));
        assert!(args.windows(2).any(|w| w == ["-passlogfile", "/ws/ffmpeg2pass"]));
        assert!(args.contains(&"-an".to_string()));
        assert!(args.windows(2).any(|w| w == ["-f", "null"]));
    }

    #[test]
    fn test_second_pass_writes_output_with_audio() {
        let target = TranscodeTarget::plan(60.0, 49).unwrap();
        let cmd = transcoder().second_pass_command(
            Path::new("/ws/in.mp4"),
            Path::new("/ws/compressed.mp4"),
            &target,
            Path::new("/ws/ffmpeg2pass"),
        );
        let args = cmd.arg_strings();
        assert!(args.windows(2).any(|w| w == ["-pass", "2"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "128k"]));
        assert_eq!(args.last().unwrap(), "/ws/compressed.mp4");
    }

    #[test]
    fn test_missing_ffmpeg_is_unavailable() {
        let t = FfmpegTranscoder::new(
            "/nonexistent/ffmpeg-for-tests",
            "/nonexistent/ffprobe-for-tests",
            WorkerPool::unbounded(),
        );
        assert!(!t.is_available());
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compress_probe_failure_skips_encoder() {
        let tools = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let marker = ws.path().join("ffmpeg-ran");
        let ffprobe = script(tools.path(), "ffprobe", "echo N/A");
        let ffmpeg = script(tools.path(), "ffmpeg", &format!("touch {}", marker.display()));
        let t = FfmpegTranscoder::new(ffmpeg, ffprobe, WorkerPool::unbounded());

        let err = t
            .compress(&ws.path().join("in.mp4"), &ws.path().join("out.mp4"), 49)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::ProbeFailure(_)));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compress_low_bitrate_skips_encoder() {
        let tools = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let marker = ws.path().join("ffmpeg-ran");
        let ffprobe = script(tools.path(), "ffprobe", "echo 7200.0");
        let ffmpeg = script(tools.path(), "ffmpeg", &format!("touch {}", marker.display()));
        let t = FfmpegTranscoder::new(ffmpeg, ffprobe, WorkerPool::unbounded());

        let err = t
            .compress(&ws.path().join("in.mp4"), &ws.path().join("out.mp4"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::BitrateTooLow { .. }));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compress_second_pass_failure_removes_output() {
        let tools = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let output = ws.path().join("out.mp4");
        let ffprobe = script(tools.path(), "ffprobe", "echo 30.0");
        // Pass 2 leaves a partial file behind and fails.
        let body = format!(
            r#"case "$*" in *"-pass 2"*) printf partial > {out}; echo 'Conversion failed!' >&2; exit 1;; esac; exit 0"#,
            out = output.display()
        );
        let ffmpeg = script(tools.path(), "ffmpeg", &body);
        let t = FfmpegTranscoder::new(ffmpeg, ffprobe, WorkerPool::unbounded());

        let err = t
            .compress(&ws.path().join("in.mp4"), &output, 49)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TranscodeError::PassFailed {
                pass: EncodePass::Second,
                diagnostic: "Conversion failed!".to_string()
            }
        );
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compress_success() {
        let tools = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let output = ws.path().join("out.mp4");
        let ffprobe = script(tools.path(), "ffprobe", "echo 30.0");
        let body = format!(
            r#"case "$*" in *"-pass 2"*) printf encoded > {out};; esac; exit 0"#,
            out = output.display()
        );
        let ffmpeg = script(tools.path(), "ffmpeg", &body);
        let t = FfmpegTranscoder::new(ffmpeg, ffprobe, WorkerPool::unbounded());

        t.compress(&ws.path().join("in.mp4"), &output, 49)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"encoded");
    }
}
