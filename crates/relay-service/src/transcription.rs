//! Speech-to-text and translation through the OpenAI audio API.

use async_trait::async_trait;
use relay_core::Interface;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::json;
use shaku::Component;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Instruction sent with every transcription request.
pub const TRANSCRIPTION_PROMPT: &str = "This audio is in either Chinese (Mandarin) or English, \
and speakers may switch between them mid-sentence (as in Singlish). \
Transcribe exactly what is spoken in the original language.";

const TRANSLATION_SYSTEM_PROMPT: &str = "You are a translator. Translate the user's message into \
{language}, preserving its meaning and tone. The message may mix Chinese and English or use \
Singaporean and Malaysian colloquialisms; render such idioms naturally in {language}. \
Reply with the translation only.";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const DEFAULT_TRANSLATION_MODEL: &str = "gpt-4o-mini";

/// Transcription errors.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Transport failure.
    #[error("Transcription request failed: {0}")]
    Request(String),

    /// Non-success response from the API.
    #[error("Transcription API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body could not be interpreted.
    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),

    /// The audio file could not be read.
    #[error("Failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns audio into text.
#[async_trait]
pub trait TranscriptionService: Interface {
    /// Transcribes in the spoken language.
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError>;

    /// Produces text in `target_language`.
    async fn translate(
        &self,
        audio: &Path,
        target_language: &str,
    ) -> Result<String, TranscriptionError>;
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI Whisper plus chat-completion translation.
///
/// English targets use the direct audio translation endpoint. Other targets
/// transcribe first and translate the text when the detected language
/// differs.
#[derive(Component)]
#[shaku(interface = TranscriptionService)]
pub struct OpenAiTranscriptionService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
    translation_model: String,
}

impl OpenAiTranscriptionService {
    /// Creates the service with the default models.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            translation_model: DEFAULT_TRANSLATION_MODEL.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = if self.base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            self.base_url.trim_end_matches('/')
        };
        format!("{}/{}", base, path)
    }

    async fn audio_form(&self, audio: &Path, response_format: &str) -> Result<multipart::Form, TranscriptionError> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map_or_else(|| "audio.mp3".to_string(), |n| n.to_string_lossy().into_owned());

        let file_part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| TranscriptionError::Request(format!("mime: {}", e)))?;

        Ok(multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .text("prompt", TRANSCRIPTION_PROMPT)
            .text("response_format", response_format.to_string())
            .part("file", file_part))
    }

    async fn post_audio(&self, endpoint: &str, form: multipart::Form) -> Result<String, TranscriptionError> {
        debug!(endpoint, model = %self.transcription_model, "Sending audio to OpenAI");

        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<String, TranscriptionError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Request(format!("body: {}", e)))?;

        if !status.is_success() {
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn translate_text(&self, text: &str, target_language: &str) -> Result<String, TranscriptionError> {
        let request = json!({
            "model": self.translation_model,
            "temperature": 0.3,
            "messages": [
                {
                    "role": "system",
                    "content": TRANSLATION_SYSTEM_PROMPT.replace("{language}", target_language),
                },
                { "role": "user", "content": text },
            ],
        });

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        let body = Self::read_body(response).await?;
        let completion: ChatCompletion = serde_json::from_str(&body)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| TranscriptionError::InvalidResponse("no completion choices".to_string()))
    }
}

#[async_trait]
impl TranscriptionService for OpenAiTranscriptionService {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError> {
        let form = self.audio_form(audio, "text").await?;
        let text = self.post_audio("audio/transcriptions", form).await?;

        info!(chars = text.len(), "Transcription completed");
        Ok(text.trim().to_string())
    }

    async fn translate(
        &self,
        audio: &Path,
        target_language: &str,
    ) -> Result<String, TranscriptionError> {
        if target_language.eq_ignore_ascii_case("english") {
            let form = self.audio_form(audio, "text").await?;
            let text = self.post_audio("audio/translations", form).await?;
            info!(chars = text.len(), "Translation to English completed");
            return Ok(text.trim().to_string());
        }

        let form = self.audio_form(audio, "verbose_json").await?;
        let body = self.post_audio("audio/transcriptions", form).await?;
        let transcription: VerboseTranscription = serde_json::from_str(&body)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        let text = transcription.text.trim();
        let detected = transcription.language.unwrap_or_default();
        if text.is_empty() || detected.eq_ignore_ascii_case(target_language) {
            debug!(language = %detected, "No text translation needed");
            return Ok(text.to_string());
        }

        let translated = self.translate_text(text, target_language).await?;
        info!(
            from = %detected,
            to = %target_language,
            chars = translated.len(),
            "Translation completed"
        );
        Ok(translated)
    }
}
