//! Outbound message delivery.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DeliveryError;

pub mod queue;
pub mod telegram;

pub use queue::{DeliveryQueue, DeliveryWorker, Receipt};
pub use telegram::TelegramChannel;

/// A URL button shown under a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkButton {
    pub text: String,
    pub url: String,
}

/// An HTML-formatted message with an optional keyboard of link buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Vec<Vec<LinkButton>>,
    pub silent: bool,
}

impl OutboundMessage {
    #[must_use]
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_button(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.keyboard.push(vec![LinkButton {
            text: text.into(),
            url: url.into(),
        }]);
        self
    }
}

/// Sends a single message to a single recipient.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// ## Errors
    /// `Unreachable` when the recipient can never be reached again,
    /// `Transient` for anything that may succeed later.
    async fn send(&self, recipient: i64, message: &OutboundMessage) -> Result<(), DeliveryError>;
}
