//! User-facing texts.

use crate::channels::TextFormat;
use crate::config::BotConfig;
use crate::error::{
    truncate_chars, BotError, EXTRACTION_DIAGNOSTIC_MAX_CHARS, UNEXPECTED_DIAGNOSTIC_MAX_CHARS,
};
use crate::media::{bytes_to_mb, MediaAsset};

pub const NOT_RECOGNIZED: &str = "❌ I couldn't find an Instagram link. \
Make sure the link contains instagram.com/p/, /reel/ or /tv/";

pub const DOWNLOADING: &str = "⏳ Downloading the video...";

pub const SENDING_VIDEO: &str = "📤 Sending the video...";

pub const NO_OUTPUT: &str = "❌ Couldn't download the video. Please try again later.";

pub const PRIVATE: &str = "🔒 This video is from a private account. It can't be downloaded.";

pub fn compressing(asset: &MediaAsset) -> String {
    format!("📦 The video is {:.0} MB, compressing with ffmpeg...", asset.size_mb())
}

pub fn compressed(asset: &MediaAsset) -> String {
    format!("✅ Compressed to {:.1} MB. Sending...", asset.size_mb())
}

pub fn sending_document(asset: &MediaAsset) -> String {
    format!(
        "📁 The video is {:.0} MB, sending it as a file\n(playable after download)",
        asset.size_mb()
    )
}

pub fn too_large(size_bytes: u64) -> String {
    format!(
        "❌ The video is too large ({:.0} MB). It can't be sent even as a file.",
        bytes_to_mb(size_bytes)
    )
}

pub fn extraction_failed(diagnostic: &str) -> String {
    format!(
        "❌ Download failed:\n<code>{}</code>",
        html_escape(&truncate_chars(diagnostic, EXTRACTION_DIAGNOSTIC_MAX_CHARS))
    )
}

pub fn unexpected(diagnostic: &str) -> String {
    format!(
        "❌ Unexpected error: {}",
        truncate_chars(diagnostic, UNEXPECTED_DIAGNOSTIC_MAX_CHARS)
    )
}

/// Terminal status text for a failed request.
pub fn failure(err: &BotError) -> (String, TextFormat) {
    match err {
        BotError::InputNotRecognized => (NOT_RECOGNIZED.to_string(), TextFormat::Plain),
        BotError::AccessDenied(_) => (PRIVATE.to_string(), TextFormat::Plain),
        BotError::Extraction(diagnostic) => (extraction_failed(diagnostic), TextFormat::Html),
        BotError::NoOutputProduced => (NO_OUTPUT.to_string(), TextFormat::Plain),
        BotError::TooLargeForAnyDelivery { size_bytes } => {
            (too_large(*size_bytes), TextFormat::Plain)
        }
        BotError::Probe(_)
        | BotError::BitrateTooLow { .. }
        | BotError::TranscodePass { .. }
        | BotError::Unexpected(_) => (unexpected(&failure_detail(err)), TextFormat::Plain),
    }
}

fn failure_detail(err: &BotError) -> String {
    match err {
        BotError::Unexpected(detail) => detail.clone(),
        other => other.to_string(),
    }
}

pub fn start_text(config: &BotConfig, ffmpeg_available: bool) -> String {
    let ffmpeg_status = if ffmpeg_available {
        "✅ installed"
    } else {
        "⚠️ not found (compression unavailable)"
    };
    format!(
        "👋 Hi! Send me a link to an Instagram post, Reel or IGTV video.\n\n\
         Supported links:\n\
         • instagram.com/p/...\n\
         • instagram.com/reel/...\n\
         • instagram.com/tv/...\n\n\
         🎬 ffmpeg: {ffmpeg_status}\n\
         📦 Video limit: {} MB\n\
         📁 File limit: {} MB",
        config.inline_limit_mb, config.document_limit_mb
    )
}

pub fn help_text(config: &BotConfig) -> String {
    let inline = config.inline_limit_mb;
    let document = config.document_limit_mb;
    format!(
        "ℹ️ How the bot works:\n\n\
         1. Downloads the video from Instagram\n\
         2. Up to {inline} MB: sends it as a video\n\
         3. Over {inline} MB with ffmpeg installed: compresses it\n\
         4. If compression didn't help: sends it as a file (up to {document} MB)\n\n\
         If a video won't download:\n\
         • The account is private\n\
         • The link is wrong\n\
         • Instagram temporarily blocked the request"
    )
}

/// Escape text for Telegram's HTML parse mode.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
