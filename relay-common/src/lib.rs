//! Relay Common - shared configuration, errors and logging for relaybot.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Small string helpers used by the channel adapters

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    BotConfig, ChannelsConfig, CliChannelConfig, Config, ObservabilityConfig, OllamaConfig,
    SystemConfig, WhatsAppConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
