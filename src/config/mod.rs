//! Bot configuration
//!
//! Built once at startup from the process environment and shared read-only
//! (behind an `Arc`) with every component. Nothing reads the environment
//! after this point.
//!
//! # Environment Variables
//!
//! - `BOT_TOKEN` - Telegram bot token (required; the placeholder is rejected)
//! - `TELEGRAM_API_BASE_URL` - Bot API base URL
//! - `INLINE_LIMIT_MB` / `DOCUMENT_LIMIT_MB` - delivery size ceilings
//! - `COMPRESS_TARGET_MB` - size target for re-encoding
//! - `YTDLP_BIN` / `FFMPEG_BIN` / `FFPROBE_BIN` - tool paths
//! - `FETCH_TIMEOUT_SECS` / `TRANSCODE_TIMEOUT_SECS` - optional tool deadlines
//! - `MAX_CONCURRENT_JOBS` - optional cap on simultaneous tool runs
//! - `WORK_DIR` - parent directory for per-request workspaces

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::delivery::SizeThresholds;
use crate::media::{mb_to_bytes, DEFAULT_TARGET_MB};

/// Value shipped in templates; running with it would mean running unauthenticated.
pub const TOKEN_PLACEHOLDER: &str = "PUT_YOUR_TOKEN_HERE";

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_INLINE_LIMIT_MB: u64 = 50;
pub const DEFAULT_DOCUMENT_LIMIT_MB: u64 = 2000;

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("BOT_TOKEN is not set: export BOT_TOKEN with the token from @BotFather")]
    MissingToken,

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("INLINE_LIMIT_MB ({inline_mb}) must be below DOCUMENT_LIMIT_MB ({document_mb})")]
    LimitsOutOfOrder { inline_mb: u64, document_mb: u64 },

    #[error("COMPRESS_TARGET_MB ({target_mb}) must be below DOCUMENT_LIMIT_MB ({document_mb})")]
    TargetOutOfRange { target_mb: u64, document_mb: u64 },
}

/// Immutable runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub bot_token: String,
    pub api_base_url: String,
    /// Largest file sent as an inline video (V).
    pub inline_limit_mb: u64,
    /// Largest file sent as a document (D). Always above `inline_limit_mb`.
    pub document_limit_mb: u64,
    pub compress_target_mb: u64,
    pub ytdlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub fetch_timeout: Option<Duration>,
    pub transcode_timeout: Option<Duration>,
    pub max_concurrent_jobs: Option<usize>,
    pub work_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = get("BOT_TOKEN").unwrap_or_else(|| TOKEN_PLACEHOLDER.to_string());
        if bot_token == TOKEN_PLACEHOLDER {
            return Err(ConfigError::MissingToken);
        }

        let inline_limit_mb = parse_positive(&get, "INLINE_LIMIT_MB", DEFAULT_INLINE_LIMIT_MB)?;
        let document_limit_mb =
            parse_positive(&get, "DOCUMENT_LIMIT_MB", DEFAULT_DOCUMENT_LIMIT_MB)?;
        if inline_limit_mb >= document_limit_mb {
            return Err(ConfigError::LimitsOutOfOrder {
                inline_mb: inline_limit_mb,
                document_mb: document_limit_mb,
            });
        }

        let compress_target_mb = parse_positive(&get, "COMPRESS_TARGET_MB", DEFAULT_TARGET_MB)?;
        if compress_target_mb >= document_limit_mb {
            return Err(ConfigError::TargetOutOfRange {
                target_mb: compress_target_mb,
                document_mb: document_limit_mb,
            });
        }

        let fetch_timeout = parse_optional::<u64>(&get, "FETCH_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let transcode_timeout = parse_optional::<u64>(&get, "TRANSCODE_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let max_concurrent_jobs =
            parse_optional::<usize>(&get, "MAX_CONCURRENT_JOBS")?.filter(|n| *n > 0);

        Ok(Self {
            bot_token,
            api_base_url: get("TELEGRAM_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            inline_limit_mb,
            document_limit_mb,
            compress_target_mb,
            ytdlp_bin: get("YTDLP_BIN").unwrap_or_else(|| "yt-dlp".into()).into(),
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".into()).into(),
            ffprobe_bin: get("FFPROBE_BIN").unwrap_or_else(|| "ffprobe".into()).into(),
            fetch_timeout,
            transcode_timeout,
            max_concurrent_jobs,
            work_dir: get("WORK_DIR").map(PathBuf::from),
        })
    }

    pub fn thresholds(&self) -> SizeThresholds {
        SizeThresholds {
            inline_bytes: mb_to_bytes(self.inline_limit_mb),
            attachment_bytes: mb_to_bytes(self.document_limit_mb),
        }
    }
}

fn parse_optional<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
    }
}

fn parse_positive(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = parse_optional::<u64>(get, key)?.unwrap_or(default);
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
