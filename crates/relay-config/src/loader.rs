//! Configuration loader with layered sources.

use crate::{format_validation_errors, AppConfig, ConfigValidator};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use relay_core::RelayError;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Conventional provider variable names and the keys they populate.
const PROVIDER_ENV_KEYS: &[(&str, &str)] = &[
    ("TWILIO_ACCOUNT_SID", "twilio.account_sid"),
    ("TWILIO_AUTH_TOKEN", "twilio.auth_token"),
    ("TWILIO_WHATSAPP_NUMBER", "twilio.whatsapp_number"),
    ("OPENAI_API_KEY", "openai.api_key"),
];

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `RELAY_` prefix
    /// 5. `TWILIO_*` / `OPENAI_API_KEY` provider variables
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Configuration` when a source cannot be parsed or
    /// the merged configuration fails validation.
    pub fn new(config_dir: impl Into<String>) -> Result<Self, RelayError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::new`].
    pub fn from_default_location() -> Result<Self, RelayError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// # Errors
    ///
    /// Keeps the previous configuration and returns the error when the new
    /// one does not load.
    pub async fn reload(&self) -> Result<(), RelayError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &str) -> Result<AppConfig, RelayError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("RELAY_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .separator("__")
                .try_parsing(true),
        );

        builder = Self::apply_provider_env(builder).map_err(config_error_to_relay_error)?;

        let app_config: AppConfig = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(config_error_to_relay_error)?;

        ConfigValidator::validate(&app_config)
            .map_err(|errors| RelayError::Configuration(format_validation_errors(&errors)))?;

        Ok(app_config)
    }

    fn apply_provider_env(
        mut builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        for (var, key) in PROVIDER_ENV_KEYS {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            if value.is_some() {
                debug!(key = %key, "Using provider variable {}", var);
            }
            builder = builder.set_override_option(*key, value)?;
        }
        Ok(builder)
    }
}

fn config_error_to_relay_error(err: ConfigError) -> RelayError {
    RelayError::Configuration(err.to_string())
}
