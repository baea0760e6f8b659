//! reelgrab library
//!
//! Telegram bot that takes an Instagram post link, downloads the video with
//! yt-dlp, re-encodes it when it is too big to send inline, and delivers it
//! as a video or a document within Telegram's size limits.

pub mod channels;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod exec;
pub mod handler;
pub mod links;
pub mod logging;
pub mod media;
pub mod replies;
