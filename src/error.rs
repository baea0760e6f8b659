//! Request-level failure taxonomy.
//!
//! Component errors ([`FetchError`], [`TranscodeError`], [`ChannelError`],
//! [`WorkerError`]) convert into [`BotError`] at the request handler
//! boundary, where each one becomes a single user-facing status message.

use std::io;

use thiserror::Error;

use crate::channels::ChannelError;
use crate::exec::WorkerError;
use crate::logging::redact::sanitize_log_message;
use crate::media::{EncodePass, FetchError, TranscodeError};

/// Longest backend diagnostic shown to a user for extraction failures.
pub const EXTRACTION_DIAGNOSTIC_MAX_CHARS: usize = 300;

/// Longest diagnostic shown to a user for unexpected failures.
pub const UNEXPECTED_DIAGNOSTIC_MAX_CHARS: usize = 200;

/// Failure kinds, without payloads. Handy for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InputNotRecognized,
    AccessDenied,
    ExtractionError,
    NoOutputProduced,
    ProbeFailure,
    BitrateTooLow,
    TranscodePassFailure,
    TooLargeForAnyDelivery,
    UnexpectedFailure,
}

/// Every way a request can end without delivering media.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BotError {
    #[error("message contains no supported link")]
    InputNotRecognized,

    #[error("content is private or requires login: {0}")]
    AccessDenied(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("extraction finished without producing a file")]
    NoOutputProduced,

    #[error("could not determine duration: {0}")]
    Probe(String),

    #[error("target video bitrate too low: {video_kbps} kbps")]
    BitrateTooLow { video_kbps: i64 },

    #[error("encoder {pass} failed: {diagnostic}")]
    TranscodePass { pass: EncodePass, diagnostic: String },

    #[error("media is {size_bytes} bytes, above every delivery limit")]
    TooLargeForAnyDelivery { size_bytes: u64 },

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl BotError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BotError::InputNotRecognized => FailureKind::InputNotRecognized,
            BotError::AccessDenied(_) => FailureKind::AccessDenied,
            BotError::Extraction(_) => FailureKind::ExtractionError,
            BotError::NoOutputProduced => FailureKind::NoOutputProduced,
            BotError::Probe(_) => FailureKind::ProbeFailure,
            BotError::BitrateTooLow { .. } => FailureKind::BitrateTooLow,
            BotError::TranscodePass { .. } => FailureKind::TranscodePassFailure,
            BotError::TooLargeForAnyDelivery { .. } => FailureKind::TooLargeForAnyDelivery,
            BotError::Unexpected(_) => FailureKind::UnexpectedFailure,
        }
    }

    /// Failures caused by the input rather than by the bot. Logged below error level.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            BotError::InputNotRecognized
                | BotError::AccessDenied(_)
                | BotError::TooLargeForAnyDelivery { .. }
        )
    }
}

impl From<FetchError> for BotError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::AccessDenied(d) => BotError::AccessDenied(d),
            FetchError::Extraction(d) => BotError::Extraction(d),
            FetchError::NoOutputProduced => BotError::NoOutputProduced,
            FetchError::Worker(e) => e.into(),
        }
    }
}

impl From<TranscodeError> for BotError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::ProbeFailure(d) => BotError::Probe(d),
            TranscodeError::BitrateTooLow { video_kbps } => BotError::BitrateTooLow { video_kbps },
            TranscodeError::PassFailed { pass, diagnostic } => {
                BotError::TranscodePass { pass, diagnostic }
            }
            TranscodeError::Worker(e) => e.into(),
        }
    }
}

impl From<WorkerError> for BotError {
    fn from(err: WorkerError) -> Self {
        BotError::Unexpected(err.to_string())
    }
}

impl From<ChannelError> for BotError {
    fn from(err: ChannelError) -> Self {
        BotError::Unexpected(sanitize_log_message(&err.to_string()))
    }
}

impl From<io::Error> for BotError {
    fn from(err: io::Error) -> Self {
        BotError::Unexpected(err.to_string())
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
