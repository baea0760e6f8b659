//! Telegram inbound update parsing helpers.

use serde::Deserialize;

/// Telegram update payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

/// Telegram message payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
}

/// Telegram chat metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// Telegram user metadata. Also the result of `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

/// A text message from a person, ready for the request handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub sender_id: Option<i64>,
    pub text: String,
}

impl InboundMessage {
    /// The command this message carries for the bot named `bot_username`.
    pub fn command(&self, bot_username: Option<&str>) -> Option<BotCommand> {
        BotCommand::parse(&self.text, bot_username)
    }
}

/// Extract a text-bearing inbound message from a Telegram update.
///
/// Edits, channel posts and anything sent by a bot are ignored.
pub fn extract_inbound(update: &TelegramUpdate) -> Option<InboundMessage> {
    let message = update.message.as_ref()?;

    if message.from.as_ref().is_some_and(|from| from.is_bot) {
        return None;
    }

    let text = message.text.as_ref().filter(|t| !t.trim().is_empty())?;

    Some(InboundMessage {
        chat_id: message.chat.id,
        message_id: message.message_id,
        sender_id: message.from.as_ref().map(|u| u.id),
        text: text.clone(),
    })
}

/// Slash command at the start of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    /// Any other command, lowercased and without the `/`. A command
    /// addressed to a different bot keeps its `@suffix`.
    Other(String),
}

impl BotCommand {
    /// Parse `/name` or `/name@botname`, ignoring trailing arguments.
    ///
    /// With `bot_username` set, a command addressed to another bot never
    /// resolves to [`BotCommand::Start`] or [`BotCommand::Help`].
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let first = text.trim_start().split_whitespace().next()?;
        let command = first.strip_prefix('/')?.to_ascii_lowercase();
        let (name, addressee) = match command.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (command.as_str(), None),
        };
        if name.is_empty() {
            return None;
        }

        let for_us = match (addressee, bot_username) {
            (Some(addressee), Some(me)) => addressee.eq_ignore_ascii_case(me),
            _ => true,
        };
        if !for_us {
            return Some(BotCommand::Other(command));
        }

        Some(match name {
            "start" => BotCommand::Start,
            "help" => BotCommand::Help,
            other => BotCommand::Other(other.to_string()),
        })
    }
}
