//! Configuration validation.
//!
//! Collects every problem in one pass so an operator sees the whole list
//! instead of fixing one key per restart.

use crate::AppConfig;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A required credential or identifier is empty.
    MissingValue { name: String },
    /// Port number is invalid (must be 1-65535).
    InvalidPort { value: u16 },
    /// A numeric field must be positive.
    NonPositive { name: String },
    /// Timeout value must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Priority class name is not recognised.
    InvalidPriority { value: String },
    /// URL does not use an http(s) scheme.
    InvalidUrl { name: String, value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingValue { name } => write!(f, "'{}' is required but empty", name),
            Self::InvalidPort { value } => {
                write!(f, "Invalid port: {} (must be 1-65535)", value)
            }
            Self::NonPositive { name } => write!(f, "'{}' must be greater than zero", name),
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::InvalidPriority { value } => write!(
                f,
                "Invalid priority: '{}' (valid: low, normal, high, critical)",
                value
            ),
            Self::InvalidUrl { name, value } => {
                write!(f, "Invalid URL for '{}': {}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    const VALID_PRIORITIES: &'static [&'static str] = &["low", "normal", "high", "critical"];

    /// Validates the whole configuration tree.
    ///
    /// # Errors
    ///
    /// Returns every validation error found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_server(config, &mut errors);
        Self::validate_providers(config, &mut errors);
        Self::validate_queue(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.server.port == 0 {
            errors.push(ConfigValidationError::InvalidPort { value: 0 });
        }
        if config.server.request_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "server.request_timeout_secs".to_string(),
                value: 0,
            });
        }
    }

    fn validate_providers(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let required = [
            ("twilio.account_sid", &config.twilio.account_sid),
            ("twilio.auth_token", &config.twilio.auth_token),
            ("twilio.whatsapp_number", &config.twilio.whatsapp_number),
            ("openai.api_key", &config.openai.api_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                errors.push(ConfigValidationError::MissingValue {
                    name: name.to_string(),
                });
            }
        }

        for (name, value) in [
            ("twilio.api_base_url", &config.twilio.api_base_url),
            ("openai.base_url", &config.openai.base_url),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                errors.push(ConfigValidationError::InvalidUrl {
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
        }

        if config.audio.download_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "audio.download_timeout_secs".to_string(),
                value: 0,
            });
        }
    }

    fn validate_queue(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let queue = &config.queue;

        if queue.name.trim().is_empty() {
            errors.push(ConfigValidationError::MissingValue {
                name: "queue.name".to_string(),
            });
        }
        if queue.max_workers == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "queue.max_workers".to_string(),
            });
        }
        if queue.max_queue_depth == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "queue.max_queue_depth".to_string(),
            });
        }
        if queue.circuit_breaker_failure_threshold == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "queue.circuit_breaker_failure_threshold".to_string(),
            });
        }
        if queue.task_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveTimeout {
                name: "queue.task_timeout_secs".to_string(),
                value: 0,
            });
        }
        if !Self::VALID_PRIORITIES.contains(&queue.priority.to_lowercase().as_str()) {
            errors.push(ConfigValidationError::InvalidPriority {
                value: queue.priority.clone(),
            });
        }
    }
}

/// Formats validation errors for display.
#[must_use]
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}
