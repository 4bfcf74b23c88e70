//! Operator log channel.
//!
//! Cycle summaries, session notices and errors are mirrored to an optional
//! chat. Posting is best-effort: failures are logged and never propagate.

use std::sync::Arc;

use crate::delivery::{DeliveryChannel, OutboundMessage};
use crate::render::escape_html;

#[derive(Clone)]
pub struct OpsLog {
    channel: Option<(Arc<dyn DeliveryChannel>, i64)>,
}

impl OpsLog {
    #[must_use]
    pub fn new(channel: Arc<dyn DeliveryChannel>, chat_id: Option<i64>) -> Self {
        Self {
            channel: chat_id.map(|id| (channel, id)),
        }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self { channel: None }
    }

    /// `info`, `warn` and `error` take plain text and escape it for HTML.
    pub async fn info(&self, text: &str) {
        self.post(&format!("ℹ️ {}", escape_html(text))).await;
    }

    pub async fn warn(&self, text: &str) {
        self.post(&format!("⚠️ {}", escape_html(text))).await;
    }

    pub async fn error(&self, text: &str) {
        self.post(&format!("❌ {}", escape_html(text))).await;
    }

    /// Posts `text` as-is; it must already be valid Telegram HTML.
    pub async fn post(&self, text: &str) {
        let Some((channel, chat_id)) = &self.channel else {
            return;
        };
        let mut message = OutboundMessage::html(text);
        message.silent = true;
        if let Err(e) = channel.send(*chat_id, &message).await {
            tracing::warn!(error = %e, "Failed to post to operator log channel");
        }
    }
}
