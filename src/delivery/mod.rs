//! Size-adaptive delivery selection.
//!
//! A fetched video is sent inline when it fits the inline ceiling. When it
//! does not, it is re-encoded at most once and the decision is taken again
//! on the result; whatever is still too big for inline goes out as a
//! document, or is rejected when it is above the document ceiling too.
//!
//! ```text
//! Fetched ──S ≤ V──────────────────────────────▶ SendInline
//!    │
//!    ├─S > V, no encoder ─────────────┐
//!    │                                ▼
//!    └─S > V ─▶ Compress ─fail──▶ attachment check ─S ≤ D─▶ SendAsAttachment
//!                  │ ok               ▲            └S > D─▶ RejectTooLarge
//!                  ▼                  │
//!             re-decide once ──S > V──┘
//!                  └──S ≤ V──▶ SendInline
//! ```

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::BotError;
use crate::media::{MediaAsset, Transcoder};
use crate::replies;

/// File name of the re-encoded video inside the workspace.
pub const COMPRESSED_FILE_NAME: &str = "compressed.mp4";

/// Size ceilings in bytes. `inline_bytes < attachment_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeThresholds {
    pub inline_bytes: u64,
    pub attachment_bytes: u64,
}

/// Next step for a file of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    SendInline,
    AttemptCompress,
    SendAsAttachment,
    RejectTooLarge,
}

/// Decide what to do with a file of `size_bytes`.
///
/// `may_compress` is false once compression was tried (or when no encoder
/// is installed), which is what keeps the state machine from looping.
pub fn decide(size_bytes: u64, thresholds: SizeThresholds, may_compress: bool) -> DeliveryDecision {
    if size_bytes <= thresholds.inline_bytes {
        DeliveryDecision::SendInline
    } else if may_compress {
        DeliveryDecision::AttemptCompress
    } else if size_bytes > thresholds.attachment_bytes {
        DeliveryDecision::RejectTooLarge
    } else {
        DeliveryDecision::SendAsAttachment
    }
}

/// How the final file is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    Inline,
    Attachment,
}

/// Terminal success state of the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPlan {
    pub method: DeliveryMethod,
    pub asset: MediaAsset,
    /// Size of the original download when `asset` is its re-encode.
    pub compressed_from: Option<u64>,
}

/// Receives progress text while the selector works.
#[async_trait]
pub trait ProgressSink: Send {
    async fn progress(&mut self, text: &str);
}

#[async_trait]
impl ProgressSink for Vec<String> {
    async fn progress(&mut self, text: &str) {
        self.push(text.to_string());
    }
}

/// Drives [`decide`] to a terminal state, compressing at most once.
pub struct DeliverySelector<'a> {
    thresholds: SizeThresholds,
    target_mb: u64,
    transcoder: Option<&'a dyn Transcoder>,
}

impl<'a> DeliverySelector<'a> {
    pub fn new(
        thresholds: SizeThresholds,
        target_mb: u64,
        transcoder: Option<&'a dyn Transcoder>,
    ) -> Self {
        Self {
            thresholds,
            target_mb,
            transcoder,
        }
    }

    /// Settle how `asset` is delivered. Files above both ceilings end in
    /// [`BotError::TooLargeForAnyDelivery`].
    pub async fn resolve(
        &self,
        asset: MediaAsset,
        workspace: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<DeliveryPlan, BotError> {
        let mut transcoder = self.transcoder.filter(|t| t.is_available());
        let mut current = asset;
        let mut compressed_from = None;

        loop {
            let decision = decide(current.size_bytes, self.thresholds, transcoder.is_some());
            match decision {
                DeliveryDecision::SendInline => {
                    return Ok(DeliveryPlan {
                        method: DeliveryMethod::Inline,
                        asset: current,
                        compressed_from,
                    })
                }
                DeliveryDecision::SendAsAttachment => {
                    return Ok(DeliveryPlan {
                        method: DeliveryMethod::Attachment,
                        asset: current,
                        compressed_from,
                    })
                }
                DeliveryDecision::RejectTooLarge => {
                    return Err(BotError::TooLargeForAnyDelivery {
                        size_bytes: current.size_bytes,
                    })
                }
                DeliveryDecision::AttemptCompress => {
                    let Some(encoder) = transcoder.take() else {
                        continue;
                    };
                    progress.progress(&replies::compressing(&current)).await;
                    let original_size = current.size_bytes;
                    current = match self.compress(encoder, current, workspace).await {
                        Ok(compressed) => {
                            compressed_from = Some(original_size);
                            compressed
                        }
                        Err(original) => original,
                    };
                }
            }
        }
    }

    /// Re-encode `asset`. On success the original file is discarded and the
    /// re-encode returned; on failure the original is handed back untouched.
    async fn compress(
        &self,
        encoder: &dyn Transcoder,
        asset: MediaAsset,
        workspace: &Path,
    ) -> Result<MediaAsset, MediaAsset> {
        let output = workspace.join(COMPRESSED_FILE_NAME);
        if let Err(e) = encoder.compress(&asset.path, &output, self.target_mb).await {
            let err = BotError::from(e);
            warn!(kind = ?err.kind(), error = %err, "compression failed, falling back to original");
            return Err(asset);
        }

        let compressed = match MediaAsset::from_path(&output, asset.title.clone()) {
            Ok(compressed) => compressed,
            Err(e) => {
                warn!(error = %e, "encoder reported success but produced no file");
                return Err(asset);
            }
        };

        info!(
            before_bytes = asset.size_bytes,
            after_bytes = compressed.size_bytes,
            "compressed"
        );
        if let Err(e) = tokio::fs::remove_file(&asset.path).await {
            warn!(error = %e, path = %asset.path.display(), "could not discard original download");
        }
        Ok(compressed)
    }
}
