//! Request handler
//!
//! Drives one inbound message from link recognition to delivery:
//!
//! 1. find the post link (or answer with a corrective reply)
//! 2. post a "downloading" status in reply to the message
//! 3. fetch the media into a private workspace
//! 4. let the [`DeliverySelector`] settle inline, attachment or rejection
//! 5. upload, then remove the status; on any failure edit the status to
//!    a failure text instead
//!
//! Every failure is caught here. Nothing propagates back into the receive
//! loop, and the workspace is gone by the time the handler returns.

pub mod context;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::channels::{
    BotCommand, ChatTransport, InboundMessage, MessageHandler, StatusMessage,
};
use crate::config::BotConfig;
use crate::delivery::{DeliveryMethod, DeliverySelector};
use crate::error::{BotError, FailureKind};
use crate::links::find_instagram_url;
use crate::logging::redact::sanitize_log_message;
use crate::media::{MediaFetcher, Transcoder};
use crate::replies;

pub use context::RequestContext;

/// How a message was dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A command was answered.
    Replied,
    /// An unknown command; nothing was sent.
    Ignored,
    /// No supported link; a corrective reply was sent.
    NotRecognized,
    Delivered(DeliveryMethod),
    Failed(FailureKind),
    /// The initial status could not be posted, so the request was dropped.
    StatusUnavailable,
}

/// Handles inbound messages. Cheap to share behind an `Arc`.
pub struct RequestHandler {
    config: Arc<BotConfig>,
    transport: Arc<dyn ChatTransport>,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Option<Arc<dyn Transcoder>>,
    bot_username: Option<String>,
}

impl RequestHandler {
    pub fn new(
        config: Arc<BotConfig>,
        transport: Arc<dyn ChatTransport>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            config,
            transport,
            fetcher,
            transcoder: None,
            bot_username: None,
        }
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Only answer commands without a `@suffix` or addressed to `username`.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    fn compression_available(&self) -> bool {
        self.transcoder.as_ref().is_some_and(|t| t.is_available())
    }

    /// Route a message to a command reply or the download flow.
    pub async fn dispatch(&self, message: &InboundMessage) -> RequestOutcome {
        match message.command(self.bot_username.as_deref()) {
            Some(BotCommand::Start) => {
                let text = replies::start_text(&self.config, self.compression_available());
                self.reply(message, &text).await;
                RequestOutcome::Replied
            }
            Some(BotCommand::Help) => {
                self.reply(message, &replies::help_text(&self.config)).await;
                RequestOutcome::Replied
            }
            Some(BotCommand::Other(name)) => {
                debug!(command = %name, chat_id = message.chat_id, "ignoring unknown command");
                RequestOutcome::Ignored
            }
            None => self.handle_text(message).await,
        }
    }

    /// Run the download flow for a plain text message.
    pub async fn handle_text(&self, message: &InboundMessage) -> RequestOutcome {
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            chat_id = message.chat_id,
            message_id = message.message_id,
            sender_id = message.sender_id,
        );
        self.process(message).instrument(span).await
    }

    async fn process(&self, message: &InboundMessage) -> RequestOutcome {
        let Some(url) = find_instagram_url(&message.text) else {
            debug!("no supported link in message");
            self.reply(message, replies::NOT_RECOGNIZED).await;
            return RequestOutcome::NotRecognized;
        };
        info!(url, "request accepted");

        let mut status = match StatusMessage::post(
            Arc::clone(&self.transport),
            message.chat_id,
            message.message_id,
            replies::DOWNLOADING,
        )
        .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %sanitize_log_message(&e.to_string()), "could not post status, dropping request");
                return RequestOutcome::StatusUnavailable;
            }
        };

        let result = match RequestContext::create(url, self.config.work_dir.as_deref()) {
            Ok(ctx) => {
                let result = self.deliver(&ctx, message, &mut status).await;
                if let Err(e) = ctx.close() {
                    warn!(error = %e, "could not remove workspace");
                }
                result
            }
            Err(e) => Err(BotError::from(e)),
        };

        match result {
            Ok(method) => {
                status.finish().await;
                info!(?method, "delivered");
                RequestOutcome::Delivered(method)
            }
            Err(err) => {
                if err.is_expected() {
                    info!(kind = ?err.kind(), error = %err, "request rejected");
                } else {
                    error!(kind = ?err.kind(), error = %err, "request failed");
                }
                let (text, format) = replies::failure(&err);
                status.fail(&text, format).await;
                RequestOutcome::Failed(err.kind())
            }
        }
    }

    async fn deliver(
        &self,
        ctx: &RequestContext,
        message: &InboundMessage,
        status: &mut StatusMessage,
    ) -> Result<DeliveryMethod, BotError> {
        let asset = self.fetcher.fetch(&ctx.url, ctx.workspace()).await?;
        info!(size_bytes = asset.size_bytes, file = %asset.file_name(), "fetched");

        let selector = DeliverySelector::new(
            self.config.thresholds(),
            self.config.compress_target_mb,
            self.transcoder.as_deref(),
        );
        let plan = selector.resolve(asset, ctx.workspace(), status).await?;

        let reply_to = Some(message.message_id);
        match plan.method {
            DeliveryMethod::Inline => {
                let text = match plan.compressed_from {
                    Some(_) => replies::compressed(&plan.asset),
                    None => replies::SENDING_VIDEO.to_string(),
                };
                status.update(&text).await;
                self.transport
                    .send_video(message.chat_id, reply_to, &plan.asset)
                    .await?;
            }
            DeliveryMethod::Attachment => {
                status.update(&replies::sending_document(&plan.asset)).await;
                self.transport
                    .send_document(message.chat_id, reply_to, &plan.asset)
                    .await?;
            }
        }
        Ok(plan.method)
    }

    async fn reply(&self, message: &InboundMessage, text: &str) {
        if let Err(e) = self
            .transport
            .send_text(message.chat_id, Some(message.message_id), text)
            .await
        {
            warn!(error = %sanitize_log_message(&e.to_string()), "reply failed");
        }
    }
}

#[async_trait]
impl MessageHandler for RequestHandler {
    async fn handle_message(&self, message: InboundMessage) {
        let outcome = self.dispatch(&message).await;
        debug!(?outcome, chat_id = message.chat_id, "message handled");
    }
}
