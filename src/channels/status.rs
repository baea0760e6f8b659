//! Per-request status message.
//!
//! One message is posted when work starts, edited as work progresses, and
//! then either deleted (the media was delivered) or edited one last time
//! to a failure text. The terminal operations take `self`, so a request
//! can end its status at most once.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ChannelResult, ChatTransport, MessageRef, TextFormat};
use crate::delivery::ProgressSink;
use crate::logging::redact::sanitize_log_message;

pub struct StatusMessage {
    transport: Arc<dyn ChatTransport>,
    message: MessageRef,
}

impl StatusMessage {
    /// Post the initial status as a reply to `reply_to`.
    pub async fn post(
        transport: Arc<dyn ChatTransport>,
        chat_id: i64,
        reply_to: i64,
        text: &str,
    ) -> ChannelResult<Self> {
        let message = transport.send_text(chat_id, Some(reply_to), text).await?;
        Ok(Self { transport, message })
    }

    /// Replace the status text. Failures are logged and otherwise ignored.
    pub async fn update(&mut self, text: &str) {
        if let Err(e) = self
            .transport
            .edit_text(self.message, text, TextFormat::Plain)
            .await
        {
            warn!(error = %sanitize_log_message(&e.to_string()), "status update failed");
        }
    }

    /// Terminal: the request succeeded, remove the status message.
    pub async fn finish(self) {
        match self.transport.delete_message(self.message).await {
            Ok(()) => debug!(message_id = self.message.message_id, "status removed"),
            Err(e) => {
                warn!(error = %sanitize_log_message(&e.to_string()), "could not remove status")
            }
        }
    }

    /// Terminal: the request failed, leave `text` as the final status.
    pub async fn fail(self, text: &str, format: TextFormat) {
        if let Err(e) = self.transport.edit_text(self.message, text, format).await {
            warn!(error = %sanitize_log_message(&e.to_string()), "could not report failure");
        }
    }
}

#[async_trait]
impl ProgressSink for StatusMessage {
    async fn progress(&mut self, text: &str) {
        self.update(text).await;
    }
}
