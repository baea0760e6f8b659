//! Chat channel plumbing
//!
//! The request handler talks to the chat platform only through
//! [`ChatTransport`]. The Telegram Bot API implementation lives in
//! [`telegram`]; inbound update parsing and the long-poll loop live in
//! [`telegram_inbound`] and [`telegram_receive`].

pub mod status;
pub mod telegram;
pub mod telegram_inbound;
pub mod telegram_receive;

use async_trait::async_trait;

use crate::media::MediaAsset;

pub use status::StatusMessage;
pub use telegram::TelegramClient;
pub use telegram_inbound::{BotCommand, InboundMessage};
pub use telegram_receive::{receive_loop, UpdateSource};

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur in channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Rate limited: retry after {0}s")]
    RateLimited(u64),

    #[error("Bot API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A message previously sent by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// How message text is interpreted by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextFormat {
    #[default]
    Plain,
    Html,
}

/// Message handler for incoming messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message. Runs on its own task.
    async fn handle_message(&self, message: InboundMessage);
}

/// Outbound operations the bot needs from a chat platform.
///
/// `reply_to` is the id of the user's message being answered.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> ChannelResult<MessageRef>;

    async fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
        format: TextFormat,
    ) -> ChannelResult<()>;

    async fn delete_message(&self, message: MessageRef) -> ChannelResult<()>;

    /// Send `video` as a playable inline video, captioned with its title.
    async fn send_video(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        video: &MediaAsset,
    ) -> ChannelResult<()>;

    /// Send `document` as a file attachment under its file name.
    async fn send_document(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        document: &MediaAsset,
    ) -> ChannelResult<()>;
}
