//! Telegram Bot API `sendMessage` channel.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use stockwatch_core::config::TelegramConfig;

use super::{DeliveryChannel, LinkButton, OutboundMessage};
use crate::error::{DeliveryError, ServiceError, ServiceResult};

const BLOCKED_MARKERS: &[&str] = &["bot was blocked by the user", "user is deactivated"];

#[derive(Debug, Clone)]
pub struct TelegramChannel {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_notification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup<'a>>,
}

#[derive(Serialize)]
struct ReplyMarkup<'a> {
    inline_keyboard: &'a [Vec<LinkButton>],
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    /// ## Errors
    /// `InvalidConfiguration` if the HTTP client cannot be built.
    pub fn new(config: &TelegramConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ServiceError::InvalidConfiguration(format!("telegram client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base_url.trim_end_matches('/'),
                config.bot_token
            ),
        })
    }
}

/// Maps a failed API answer to a delivery error. HTTP 403 and the blocked or
/// deactivated descriptions are permanent.
#[must_use]
pub fn classify_failure(recipient: i64, status: u16, description: &str) -> DeliveryError {
    let lowered = description.to_ascii_lowercase();
    if status == 403 || BLOCKED_MARKERS.iter().any(|m| lowered.contains(m)) {
        DeliveryError::Unreachable {
            recipient,
            reason: description.to_string(),
        }
    } else {
        DeliveryError::Transient(format!("{status}: {description}"))
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    #[tracing::instrument(skip(self, message))]
    async fn send(&self, recipient: i64, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let request = SendMessageRequest {
            chat_id: recipient,
            text: &message.text,
            parse_mode: "HTML",
            disable_notification: message.silent,
            reply_markup: (!message.keyboard.is_empty()).then_some(ReplyMarkup {
                inline_keyboard: &message.keyboard,
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = response.status().as_u16();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transient(format!("{status}: {e}")))?;

        if body.ok {
            return Ok(());
        }

        Err(classify_failure(
            recipient,
            body.error_code.unwrap_or(status),
            body.description.as_deref().unwrap_or_default(),
        ))
    }
}
