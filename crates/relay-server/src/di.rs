//! Dependency injection module using Shaku.
//!
//! `RelayModule` holds the three provider adapters. Each component receives
//! its settings as parameters; all share one HTTP client.

use relay_config::AppConfig;
use relay_core::{RelayError, RelayResult};
use relay_service::{
    AudioService, HttpAudioService, HttpAudioServiceParameters, MessagingService,
    OpenAiTranscriptionService, OpenAiTranscriptionServiceParameters, TranscriptionService,
    TwilioMessagingService, TwilioMessagingServiceParameters,
};
use shaku::{module, HasComponent};
use std::sync::Arc;

module! {
    pub RelayModule {
        components = [
            HttpAudioService,
            OpenAiTranscriptionService,
            TwilioMessagingService,
        ],
        providers = [],
    }
}

impl RelayModule {
    /// Resolves the audio service.
    pub fn audio_service(&self) -> Arc<dyn AudioService> {
        self.resolve()
    }

    /// Resolves the transcription service.
    pub fn transcription_service(&self) -> Arc<dyn TranscriptionService> {
        self.resolve()
    }

    /// Resolves the messaging service.
    pub fn messaging_service(&self) -> Arc<dyn MessagingService> {
        self.resolve()
    }
}

/// Builds the module from configuration.
///
/// # Errors
///
/// Returns a configuration error when the HTTP client cannot be built.
pub fn build_module(config: &AppConfig) -> RelayResult<Arc<RelayModule>> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("whatsapp-voice-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RelayError::configuration(format!("Failed to build HTTP client: {}", e)))?;

    let module = RelayModule::builder()
        .with_component_parameters::<HttpAudioService>(HttpAudioServiceParameters {
            client: client.clone(),
            ffmpeg_path: config.audio.ffmpeg_path.clone(),
            temp_dir: config.audio.temp_dir(),
            download_timeout: config.audio.download_timeout(),
        })
        .with_component_parameters::<OpenAiTranscriptionService>(
            OpenAiTranscriptionServiceParameters {
                client: client.clone(),
                api_key: config.openai.api_key.clone(),
                base_url: config.openai.base_url.clone(),
                transcription_model: config.openai.transcription_model.clone(),
                translation_model: config.openai.translation_model.clone(),
            },
        )
        .with_component_parameters::<TwilioMessagingService>(TwilioMessagingServiceParameters {
            client,
            account_sid: config.twilio.account_sid.clone(),
            auth_token: config.twilio.auth_token.clone(),
            whatsapp_number: config.twilio.whatsapp_number.clone(),
            api_base_url: config.twilio.api_base_url.clone(),
        })
        .build();

    Ok(Arc::new(module))
}
