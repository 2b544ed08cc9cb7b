//! Outbound WhatsApp replies through Twilio.

use async_trait::async_trait;
use relay_core::Interface;
use serde::Deserialize;
use shaku::Component;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_API_BASE_URL: &str = "https://api.twilio.com";

/// Messaging errors.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Messaging request failed: {0}")]
    Request(String),

    #[error("Messaging API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid messaging response: {0}")]
    InvalidResponse(String),
}

/// Provider-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sends text replies to a sender address.
#[async_trait]
pub trait MessagingService: Interface {
    /// Sends `body` to `to` and returns the provider message id.
    async fn send(&self, to: &str, body: &str) -> Result<MessageId, MessagingError>;
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// Twilio Messages API client.
#[derive(Component)]
#[shaku(interface = MessagingService)]
pub struct TwilioMessagingService {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    whatsapp_number: String,
    api_base_url: String,
}

impl TwilioMessagingService {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        whatsapp_number: impl Into<String>,
        api_base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            whatsapp_number: whatsapp_number.into(),
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        }
    }

    fn messages_url(&self) -> String {
        let base = if self.api_base_url.is_empty() {
            DEFAULT_API_BASE_URL
        } else {
            self.api_base_url.trim_end_matches('/')
        };
        format!("{}/2010-04-01/Accounts/{}/Messages.json", base, self.account_sid)
    }

    fn sender(&self) -> String {
        format!("whatsapp:{}", self.whatsapp_number)
    }
}

#[async_trait]
impl MessagingService for TwilioMessagingService {
    async fn send(&self, to: &str, body: &str) -> Result<MessageId, MessagingError> {
        let from = self.sender();
        debug!(to, chars = body.len(), "Sending reply");

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", from.as_str()), ("To", to), ("Body", body)])
            .send()
            .await
            .map_err(|e| MessagingError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MessagingError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(MessagingError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let resource: MessageResource = serde_json::from_str(&text)
            .map_err(|e| MessagingError::InvalidResponse(e.to_string()))?;

        info!(to, sid = %resource.sid, "Reply sent");
        Ok(MessageId(resource.sid))
    }
}
