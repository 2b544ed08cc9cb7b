//! Application configuration structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Messaging provider (Twilio) credentials.
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Transcription provider (OpenAI) configuration.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Audio download and conversion settings.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Audio processing queue configuration.
    #[serde(default)]
    pub queue: QueueSettings,

    /// Output mode of the processing pipeline.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "whatsapp-voice-relay".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Returns the socket address string the server binds to.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Twilio account used both to fetch media and to send replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    /// Account SID.
    pub account_sid: String,
    /// Auth token.
    pub auth_token: String,
    /// WhatsApp-enabled sender number, without the `whatsapp:` prefix.
    pub whatsapp_number: String,
    /// REST API base URL.
    pub api_base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            whatsapp_number: String::new(),
            api_base_url: "https://api.twilio.com".to_string(),
        }
    }
}

/// OpenAI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key.
    pub api_key: String,
    /// API base URL.
    pub base_url: String,
    /// Speech-to-text model.
    pub transcription_model: String,
    /// Chat model used for the text translation step.
    pub translation_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            translation_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Audio download and conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Path of the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Directory for temporary audio files. Empty means the system temp dir.
    pub temp_dir: String,
    /// Media download timeout in seconds.
    pub download_timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            temp_dir: String::new(),
            download_timeout_secs: 60,
        }
    }
}

impl AudioConfig {
    /// Returns the resolved temporary directory.
    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        if self.temp_dir.is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.temp_dir)
        }
    }

    /// Returns the download timeout as a Duration.
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Audio processing queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Queue name.
    pub name: String,
    /// Number of concurrent workers.
    pub max_workers: usize,
    /// Maximum number of queued plus running jobs.
    pub max_queue_depth: usize,
    /// Priority class name (low, normal, high, critical).
    pub priority: String,
    /// Per-job execution timeout in seconds.
    pub task_timeout_secs: u64,
    /// Consecutive failures that open the circuit.
    pub circuit_breaker_failure_threshold: u32,
    /// Seconds before an open circuit admits a trial job. 0 disables.
    pub circuit_breaker_reset_secs: u64,
    /// Bounded wait for in-flight jobs at shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
    /// How long finished jobs stay queryable, in seconds.
    pub retention_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "audio_processing".to_string(),
            max_workers: 5,
            max_queue_depth: 100,
            priority: "normal".to_string(),
            task_timeout_secs: 300,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_reset_secs: 60,
            shutdown_timeout_secs: 10,
            retention_secs: 3600,
        }
    }
}

impl QueueSettings {
    /// Returns the task timeout as a Duration.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Returns the circuit reset timeout, if automatic half-open is enabled.
    #[must_use]
    pub const fn circuit_breaker_reset(&self) -> Option<Duration> {
        if self.circuit_breaker_reset_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.circuit_breaker_reset_secs))
        }
    }

    /// Returns the shutdown timeout as a Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns the retention window as a Duration.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// What the pipeline produces from a voice message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Translate into the target language.
    #[default]
    Translate,
    /// Transcribe in the spoken language.
    Transcribe,
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Translate => write!(f, "translate"),
            Self::Transcribe => write!(f, "transcribe"),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output mode.
    pub mode: PipelineMode,
    /// Target language for translate mode.
    pub target_language: String,
    /// Send an immediate "processing" reply when a voice message arrives.
    pub send_acknowledgement: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Translate,
            target_language: "English".to_string(),
            send_acknowledgement: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Emit logs as JSON lines.
    pub json_logs: bool,
}
