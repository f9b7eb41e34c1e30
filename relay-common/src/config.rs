//! Configuration management for relaybot.
//!
//! The bot reads a single JSON file at `~/.relaybot/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (RELAYBOT_* prefix)
//! 3. Explicit config file values
//! 4. Default values
//!
//! # Environment Variable Mapping
//!
//! - `RELAYBOT_CONFIG` → path of the config file
//! - `RELAYBOT_OWNER` → bot.owner
//! - `RELAYBOT_SECRET` → bot.relay_secret
//! - `RELAYBOT_MODEL` → bot.model
//! - `RELAYBOT_PORT` → channels.port
//! - `RELAYBOT_LOG_LEVEL` → observability.log_level
//! - `OLLAMA_BASE_URL` → ollama.base_url

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relaybot"),
        |dirs| dirs.home_dir().join(".relaybot"),
    )
}

/// Get the configuration file path.
///
/// `RELAYBOT_CONFIG` takes precedence; `~` and `$VAR` are expanded.
pub fn config_path() -> PathBuf {
    match std::env::var("RELAYBOT_CONFIG") {
        Ok(raw) if !raw.trim().is_empty() => expand_path(&raw),
        _ => config_dir().join("config.json"),
    }
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

// ============================================================================
// Bot Configuration
// ============================================================================

/// Conversation and routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Correspondent identity of the owner (e.g. `+393312345654`).
    #[serde(default)]
    pub owner: String,

    /// Shared secret prefix that lets non-owners reach the assistant.
    /// Empty disables relay mode.
    #[serde(default)]
    pub relay_secret: String,

    /// Model identifier sent to the inference backend.
    #[serde(default = "default_model")]
    pub model: String,

    /// Idle window after which a conversation history is discarded.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Reply to the owner's `help` command.
    #[serde(default = "default_help_text")]
    pub help_text: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            relay_secret: String::new(),
            model: default_model(),
            idle_timeout_secs: default_idle_timeout_secs(),
            help_text: default_help_text(),
        }
    }
}

impl BotConfig {
    /// Idle timeout as a `Duration`.
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Whether non-owner relay requests are accepted at all.
    pub fn relay_enabled(&self) -> bool {
        !self.relay_secret.is_empty()
    }
}

fn default_model() -> String {
    "llama3".into()
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_help_text() -> String {
    "Hi, I'm an AI assistant! Ask me anything.\n\nCommands: help, ip, reboot".into()
}

// ============================================================================
// Ollama Configuration
// ============================================================================

/// Local inference endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama API base URL
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Request timeout in seconds (local models can be slow)
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_ollama_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            timeout_secs: default_ollama_timeout(),
            connect_timeout_secs: default_ollama_connect_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

fn default_ollama_timeout() -> u64 {
    300 // 5 minutes, local models can be slow
}

fn default_ollama_connect_timeout() -> u64 {
    10
}

// ============================================================================
// System Command Configuration
// ============================================================================

/// Commands used by the owner-only `ip` and `reboot` operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Program and arguments that print the public IP information.
    #[serde(default = "default_ip_lookup_command")]
    pub ip_lookup_command: Vec<String>,

    /// Program and arguments that reboot the host.
    #[serde(default = "default_reboot_command")]
    pub reboot_command: Vec<String>,

    /// Upper bound for the IP lookup command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ip_lookup_command: default_ip_lookup_command(),
            reboot_command: default_reboot_command(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_ip_lookup_command() -> Vec<String> {
    vec!["curl".into(), "ipinfo.io".into()]
}

fn default_reboot_command() -> Vec<String> {
    vec!["reboot".into()]
}

fn default_command_timeout() -> u64 {
    30
}

// ============================================================================
// Channels Configuration
// ============================================================================

/// Transport adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Bind host for the webhook server
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the webhook server
    #[serde(default = "default_port")]
    pub port: u16,

    /// WhatsApp Business Cloud API
    #[serde(default)]
    pub whatsapp: Option<WhatsAppConfig>,

    /// Local terminal channel
    #[serde(default)]
    pub cli: CliChannelConfig,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            whatsapp: None,
            cli: CliChannelConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4431
}

/// WhatsApp channel configuration (via WhatsApp Business API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    /// WhatsApp Business API phone number ID
    pub phone_number_id: String,
    /// WhatsApp Business API access token
    pub access_token: String,
    /// Webhook verify token
    #[serde(default)]
    pub verify_token: Option<String>,
    /// App secret for `X-Hub-Signature-256` verification
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Graph API base URL
    #[serde(default = "default_graph_api_url")]
    pub api_base_url: String,
}

fn default_graph_api_url() -> String {
    "https://graph.facebook.com/v18.0".into()
}

/// CLI channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Identity the typed lines are attributed to (defaults to the owner)
    #[serde(default)]
    pub identity: Option<String>,
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: vec![],
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(owner) = std::env::var("RELAYBOT_OWNER") {
            self.bot.owner = owner;
        }
        if let Ok(secret) = std::env::var("RELAYBOT_SECRET") {
            self.bot.relay_secret = secret;
        }
        if let Ok(model) = std::env::var("RELAYBOT_MODEL") {
            self.bot.model = model;
        }
        if let Ok(port) = std::env::var("RELAYBOT_PORT") {
            if let Ok(p) = port.parse() {
                self.channels.port = p;
            }
        }
        if let Ok(level) = std::env::var("RELAYBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            self.ollama.base_url = url;
        }
    }

    /// Whether the WhatsApp adapter should be started.
    pub fn whatsapp_enabled(&self) -> bool {
        self.channels.whatsapp.as_ref().is_some_and(|w| w.enabled)
    }
}
