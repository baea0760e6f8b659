//! Telegram inbound receive loop.
//!
//! Long-polls `getUpdates` and hands every accepted message to the
//! [`MessageHandler`] on its own task, so a slow download never holds up
//! the next update.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::telegram_inbound::{extract_inbound, TelegramUpdate};
use super::{ChannelError, ChannelResult, MessageHandler, TelegramClient};
use crate::logging::redact::sanitize_log_message;

/// Long-poll timeout passed to Telegram getUpdates.
pub const POLL_TIMEOUT_SECS: u64 = 30;
/// Backoff between failed poll attempts.
const ERROR_BACKOFF: Duration = Duration::from_secs(3);
/// Consecutive failures logged before going quiet until recovery.
const LOGGED_ERRORS: u32 = 3;

/// Where updates come from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn poll(&self, offset: Option<i64>, timeout_secs: u64)
        -> ChannelResult<Vec<TelegramUpdate>>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> ChannelResult<Vec<TelegramUpdate>> {
        self.get_updates(offset, timeout_secs).await
    }
}

/// Run the long-polling receive loop until `shutdown` turns true.
pub async fn receive_loop(
    source: Arc<dyn UpdateSource>,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Telegram receive loop started");

    let mut offset: Option<i64> = None;
    let mut consecutive_errors: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let polled = tokio::select! {
            polled = source.poll(offset, POLL_TIMEOUT_SECS) => polled,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        match polled {
            Ok(updates) => {
                if consecutive_errors > 0 {
                    info!(errors = consecutive_errors, "Telegram receive loop recovered");
                    consecutive_errors = 0;
                }
                debug!(count = updates.len(), "polled updates");

                for update in updates {
                    offset = next_offset_after_update(offset, update.update_id);
                    let Some(message) = extract_inbound(&update) else {
                        continue;
                    };
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.handle_message(message).await;
                    });
                }
            }
            Err(err) => {
                consecutive_errors += 1;
                if consecutive_errors <= LOGGED_ERRORS {
                    warn!(
                        error = %sanitize_log_message(&err.to_string()),
                        "Telegram getUpdates failed"
                    );
                } else if consecutive_errors == LOGGED_ERRORS + 1 {
                    warn!("Telegram receive errors continuing (suppressing further logs until recovery)");
                }

                tokio::select! {
                    _ = tokio::time::sleep(backoff_for(&err)) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("Telegram receive loop shutting down");
}

fn backoff_for(err: &ChannelError) -> Duration {
    match err {
        ChannelError::RateLimited(secs) => Duration::from_secs(*secs).max(ERROR_BACKOFF),
        _ => ERROR_BACKOFF,
    }
}

fn next_offset_after_update(current: Option<i64>, update_id: Option<i64>) -> Option<i64> {
    let Some(update_id) = update_id else {
        return current;
    };
    let next = update_id.saturating_add(1);
    Some(current.map_or(next, |current_value| current_value.max(next)))
}
