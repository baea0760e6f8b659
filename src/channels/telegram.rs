//! Telegram Bot API client
//!
//! Thin async wrapper over the handful of Bot API methods the bot uses.
//! Text operations post JSON; videos and documents are streamed from disk
//! as multipart uploads so large files are never held in memory.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::telegram_inbound::{TelegramUpdate, TelegramUser};
use super::{ChannelError, ChannelResult, ChatTransport, MessageRef, TextFormat};
use crate::logging::redact::sanitize_log_message;
use crate::media::MediaAsset;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Slack on top of the long-poll timeout before the request is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);
/// Deadline for small JSON calls. Uploads have none.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

const NOT_MODIFIED: &str = "message is not modified";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(base_url: impl Into<String>, bot_token: impl Into<String>) -> ChannelResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::ConnectionFailed(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    /// Build the API endpoint URL for a method.
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> ChannelResult<T> {
        let resp = self
            .http
            .post(self.api_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(method, resp).await
    }

    /// Validate the token and return the bot's own account.
    pub async fn get_me(&self) -> ChannelResult<TelegramUser> {
        self.call("getMe", &json!({}), CALL_TIMEOUT).await
    }

    /// Switch to long polling, optionally discarding updates queued while offline.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> ChannelResult<()> {
        let _: bool = self
            .call(
                "deleteWebhook",
                &json!({ "drop_pending_updates": drop_pending_updates }),
                CALL_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> ChannelResult<Vec<TelegramUpdate>> {
        self.call(
            "getUpdates",
            &get_updates_body(offset, timeout_secs),
            Duration::from_secs(timeout_secs) + POLL_GRACE,
        )
        .await
    }

    async fn upload(
        &self,
        method: &str,
        field: &str,
        form: Form,
        asset: &MediaAsset,
    ) -> ChannelResult<()> {
        let file = tokio::fs::File::open(&asset.path).await?;
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), asset.size_bytes)
            .file_name(asset.file_name())
            .mime_str(mime_type(asset))
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        debug!(method, size_bytes = asset.size_bytes, "uploading");
        let resp = self
            .http
            .post(self.api_url(method))
            .multipart(form.part(field.to_string(), part))
            .send()
            .await
            .map_err(transport_error)?;
        let _: Value = read_response(method, resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> ChannelResult<MessageRef> {
        let sent: SentMessage = self
            .call("sendMessage", &send_message_body(chat_id, reply_to, text), CALL_TIMEOUT)
            .await?;
        Ok(MessageRef {
            chat_id,
            message_id: sent.message_id,
        })
    }

    async fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
        format: TextFormat,
    ) -> ChannelResult<()> {
        let result: ChannelResult<Value> = self
            .call("editMessageText", &edit_message_body(message, text, format), CALL_TIMEOUT)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(ChannelError::Api { description, .. }) if description.contains(NOT_MODIFIED) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_message(&self, message: MessageRef) -> ChannelResult<()> {
        let _: Value = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": message.chat_id, "message_id": message.message_id }),
                CALL_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        video: &MediaAsset,
    ) -> ChannelResult<()> {
        let form = upload_form(chat_id, reply_to, video.caption()).text("supports_streaming", "true");
        self.upload("sendVideo", "video", form, video).await
    }

    async fn send_document(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        document: &MediaAsset,
    ) -> ChannelResult<()> {
        let form = upload_form(chat_id, reply_to, document.caption());
        self.upload("sendDocument", "document", form, document).await
    }
}

fn send_message_body(chat_id: i64, reply_to: Option<i64>, text: &str) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(reply_to) = reply_to {
        body["reply_to_message_id"] = json!(reply_to);
    }
    body
}

fn edit_message_body(message: MessageRef, text: &str, format: TextFormat) -> Value {
    let mut body = json!({
        "chat_id": message.chat_id,
        "message_id": message.message_id,
        "text": text,
    });
    if format == TextFormat::Html {
        body["parse_mode"] = json!("HTML");
    }
    body
}

fn get_updates_body(offset: Option<i64>, timeout_secs: u64) -> Value {
    let mut body = json!({
        "timeout": timeout_secs,
        "allowed_updates": ["message"],
    });
    if let Some(offset) = offset {
        body["offset"] = json!(offset);
    }
    body
}

fn upload_form(chat_id: i64, reply_to: Option<i64>, caption: Option<String>) -> Form {
    let mut form = Form::new().text("chat_id", chat_id.to_string());
    if let Some(reply_to) = reply_to {
        form = form.text("reply_to_message_id", reply_to.to_string());
    }
    if let Some(caption) = caption {
        form = form.text("caption", caption);
    }
    form
}

fn mime_type(asset: &MediaAsset) -> &'static str {
    match asset.container.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

async fn read_response<T: DeserializeOwned>(
    method: &str,
    resp: reqwest::Response,
) -> ChannelResult<T> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport_error)?;
    let result = parse_api_response(status, &body);
    if let Err(e) = &result {
        debug!(method, %status, error = %e, "Bot API call failed");
    }
    result
}

/// Map a Bot API reply to its `result` or a typed error.
fn parse_api_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> ChannelResult<T> {
    let parsed: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            return Err(ChannelError::InvalidResponse(e.to_string()));
        }
        Err(_) => {
            return Err(ChannelError::Api {
                code: i64::from(status.as_u16()),
                description: body.chars().take(200).collect(),
            });
        }
    };

    if parsed.ok {
        return parsed
            .result
            .ok_or_else(|| ChannelError::InvalidResponse("ok response without result".into()));
    }

    let code = parsed
        .error_code
        .unwrap_or_else(|| i64::from(status.as_u16()));
    let description = parsed
        .description
        .unwrap_or_else(|| "request failed".to_string());
    match code {
        401 | 404 => Err(ChannelError::AuthenticationFailed(description)),
        429 => Err(ChannelError::RateLimited(
            parsed
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or_default(),
        )),
        _ => Err(ChannelError::Api { code, description }),
    }
}

fn classify_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "request timeout"
    } else if err.is_connect() {
        "connection error"
    } else {
        "request failed"
    }
}

/// Transport errors carry the request URL, which embeds the token.
fn transport_error(err: reqwest::Error) -> ChannelError {
    let kind = classify_transport_error(&err);
    let detail = sanitize_log_message(&err.without_url().to_string());
    ChannelError::ConnectionFailed(format!("{kind}: {detail}"))
}
