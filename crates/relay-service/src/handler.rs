//! The `process_audio` job: download, convert, transcribe, reply.

use crate::audio::{AudioService, MediaCredentials};
use crate::messaging::{MessageId, MessagingService};
use crate::transcription::TranscriptionService;
use async_trait::async_trait;
use futures::FutureExt;
use relay_config::PipelineMode;
use relay_jobs::{Job, JobError, JobPayload, JobResult, TaskHandler};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reply used when the transcript is empty.
pub const EMPTY_TRANSCRIPT_PLACEHOLDER: &str = "I couldn't hear anything in that audio.";

/// Reply for download, conversion and transcription failures.
pub const APOLOGY_MESSAGE: &str = "❌ Sorry, I couldn't transcribe that audio. Please try again.";

/// Reply for any other failure.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "❌ Something went wrong. Please try again later.";

/// Immediate reply when acknowledgements are enabled.
pub const ACKNOWLEDGEMENT_MESSAGE: &str = "🎧 Got your voice message, working on it...";

/// Reply when the queue refuses new work.
pub const BUSY_MESSAGE: &str = "⏳ I'm handling a lot of messages right now. Please try again in a few minutes.";

/// Payload of a `process_audio` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioJobPayload {
    pub media_url: String,
    pub sender_address: String,
    pub target_language: String,
}

impl JobPayload for AudioJobPayload {
    const TASK_TYPE: &'static str = "process_audio";
}

/// Formats the success reply for a pipeline mode.
#[must_use]
pub fn format_reply(mode: PipelineMode, text: &str) -> String {
    match mode {
        PipelineMode::Translate => format!("📝 Translation:\n\n{}", text),
        PipelineMode::Transcribe => format!("📝 Transcription:\n\n{}", text),
    }
}

/// Picks the user-facing apology for a failure.
#[must_use]
pub fn apology_for(error: &JobError) -> &'static str {
    if error.is_classified() {
        APOLOGY_MESSAGE
    } else {
        UNEXPECTED_ERROR_MESSAGE
    }
}

/// Runs the voice-message pipeline for one job.
///
/// Temporary files live only inside the pipeline future, so they are removed
/// when it completes, fails, panics, or is dropped by the queue's timeout.
/// Every failure sends exactly one apology before the original error is
/// returned to the queue manager.
pub struct ProcessAudioHandler {
    audio: Arc<dyn AudioService>,
    transcription: Arc<dyn TranscriptionService>,
    messaging: Arc<dyn MessagingService>,
    mode: PipelineMode,
    credentials: MediaCredentials,
}

impl ProcessAudioHandler {
    pub fn new(
        audio: Arc<dyn AudioService>,
        transcription: Arc<dyn TranscriptionService>,
        messaging: Arc<dyn MessagingService>,
        mode: PipelineMode,
        credentials: MediaCredentials,
    ) -> Self {
        Self {
            audio,
            transcription,
            messaging,
            mode,
            credentials,
        }
    }

    /// Processes one voice message and replies to its sender.
    ///
    /// # Errors
    ///
    /// Returns the first pipeline failure, or `JobError::Messaging` when the
    /// success reply cannot be sent.
    pub async fn process(&self, payload: &AudioJobPayload) -> JobResult<MessageId> {
        let outcome = AssertUnwindSafe(self.run_pipeline(payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Unexpected(panic_message(panic.as_ref()))));

        match outcome {
            Ok(text) => {
                let body = format_reply(self.mode, &text);
                self.messaging
                    .send(&payload.sender_address, &body)
                    .await
                    .map_err(|e| JobError::Messaging(e.to_string()))
            }
            Err(err) => {
                error!(
                    to = %payload.sender_address,
                    kind = %err.kind(),
                    error = %err,
                    "Voice message processing failed"
                );
                if let Err(send_err) = self
                    .messaging
                    .send(&payload.sender_address, apology_for(&err))
                    .await
                {
                    warn!(
                        to = %payload.sender_address,
                        error = %send_err,
                        "Failed to send apology"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, payload: &AudioJobPayload) -> JobResult<String> {
        info!(stage = "downloading", url = %payload.media_url, "Processing voice message");
        let downloaded = self
            .audio
            .download(&payload.media_url, &self.credentials)
            .await
            .map_err(|e| JobError::AudioDownload(e.to_string()))?;

        info!(stage = "converting", "Converting audio");
        let converted = self
            .audio
            .convert(&downloaded)
            .await
            .map_err(|e| JobError::AudioConversion(e.to_string()))?;

        info!(stage = "transcribing", mode = %self.mode, "Transcribing audio");
        let text = match self.mode {
            PipelineMode::Translate => {
                self.transcription
                    .translate(converted.path(), &payload.target_language)
                    .await
            }
            PipelineMode::Transcribe => self.transcription.transcribe(converted.path()).await,
        }
        .map_err(|e| JobError::Transcription(e.to_string()))?;

        let text = text.trim();
        if text.is_empty() {
            debug!("Empty transcript");
            return Ok(EMPTY_TRANSCRIPT_PLACEHOLDER.to_string());
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl TaskHandler for ProcessAudioHandler {
    async fn handle(&self, job: &Job) -> JobResult<()> {
        let payload: AudioJobPayload = job.payload()?;
        let sid = self.process(&payload).await?;
        info!(job_id = %job.id, sid = %sid, "Voice message answered");
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
