//! Inbound messaging webhook.
//!
//! The provider expects a fast 200. Voice notes are queued and answered
//! later by the `process_audio` handler; everything else is ignored.

use crate::state::AppState;
use axum::{extract::State, routing::post, Form, Json, Router};
use relay_jobs::SubmitError;
use relay_service::{AudioJobPayload, ACKNOWLEDGEMENT_MESSAGE, BUSY_MESSAGE};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Creates the webhook router.
pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_message))
}

/// Form fields posted by the messaging provider.
#[derive(Debug, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url: Option<String>,
    #[serde(rename = "MediaContentType0", default)]
    pub media_content_type: Option<String>,
}

impl InboundMessage {
    /// Returns the media URL when the message carries an audio attachment.
    #[must_use]
    pub fn audio_url(&self) -> Option<&str> {
        let count = self
            .num_media
            .as_deref()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .unwrap_or(0);
        if count == 0 {
            return None;
        }
        let is_audio = self
            .media_content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("audio/"));
        if !is_audio {
            return None;
        }
        self.media_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Webhook acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

async fn receive_message(
    State(state): State<AppState>,
    Form(message): Form<InboundMessage>,
) -> Json<WebhookAck> {
    let Some(media_url) = message.audio_url() else {
        debug!(from = ?message.from, "Ignoring message without audio");
        return WebhookAck::ok();
    };
    let Some(sender) = message.from.as_deref().filter(|s| !s.is_empty()) else {
        warn!("Audio message without sender address");
        return WebhookAck::ok();
    };

    let payload = AudioJobPayload {
        media_url: media_url.to_string(),
        sender_address: sender.to_string(),
        target_language: state.pipeline.target_language.clone(),
    };

    match state
        .queue_manager
        .enqueue(&state.queue_name, &payload, None)
    {
        Ok(job_id) => {
            info!(job_id = %job_id, from = %sender, "Voice message queued");
            if state.pipeline.send_acknowledgement {
                notify(&state, sender, ACKNOWLEDGEMENT_MESSAGE);
            }
        }
        Err(err) if err.is_busy() => {
            warn!(from = %sender, reason = err.reason(), "Queue refused voice message");
            notify(&state, sender, BUSY_MESSAGE);
        }
        Err(err @ SubmitError::QueueNotFound(_)) => {
            error!(error = %err, "Voice queue is not initialized");
        }
        Err(err) => {
            error!(from = %sender, error = %err, "Failed to queue voice message");
        }
    }

    WebhookAck::ok()
}

/// Sends a reply in the background; failures are only logged.
fn notify(state: &AppState, to: &str, body: &'static str) {
    let messaging = state.messaging.clone();
    let to = to.to_string();
    tokio::spawn(async move {
        if let Err(e) = messaging.send(&to, body).await {
            warn!(to = %to, error = %e, "Failed to send notification");
        }
    });
}
