//! Configuration validation.
//!
//! Runs once at startup; any error here is fatal.

use thiserror::Error;

use crate::config::{BotConfig, ChannelsConfig, Config, ObservabilityConfig, OllamaConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.bot.validate(),
            self.ollama.validate(),
            self.channels.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for BotConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.owner.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "bot.owner".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "bot.model".into(),
            });
        }
        if self.idle_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "bot.idle_timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Validate for OllamaConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ValidationError::InvalidValue {
                field: "ollama.base_url".into(),
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "ollama.timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ChannelsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "channels.port".into(),
            });
        }

        if let Some(wa) = self.whatsapp.as_ref().filter(|w| w.enabled) {
            if wa.access_token.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: "channels.whatsapp.access_token".into(),
                });
            }
            if wa.phone_number_id.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: "channels.whatsapp.phone_number_id".into(),
                });
            }
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.log_format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("'{other}' is not one of json, pretty"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WhatsAppConfig;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.bot.owner = "+393312345654".into();
        config
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn missing_owner_is_rejected() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field == "bot.owner"));
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        let mut config = valid_config();
        config.bot.idle_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn enabled_whatsapp_requires_credentials() {
        let mut config = valid_config();
        config.channels.whatsapp = Some(WhatsAppConfig {
            enabled: true,
            phone_number_id: "123".into(),
            access_token: String::new(),
            verify_token: None,
            app_secret: None,
            api_base_url: "https://graph.facebook.com/v18.0".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn several_errors_are_collected() {
        let mut config = Config::default();
        config.channels.port = 0;
        config.observability.log_format = "xml".into();
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn non_http_ollama_url_is_rejected() {
        let mut config = valid_config();
        config.ollama.base_url = "localhost:11434".into();
        assert!(config.validate().is_err());
    }
}
