//! Command routing for inbound chat messages.
//!
//! Each message is classified once into a [`Route`]:
//!
//! 1. owner + reserved word (`help`, `ip`, `reboot`, `status`, any case) → system command
//! 2. owner, anything else → conversational turn
//! 3. non-owner whose text starts with the relay secret → relay turn
//! 4. everything else → dropped
//!
//! Conversational and relay turns share the session keyed by the sender.

use crate::error::{CommandError, SendError};
use crate::inference::InferenceBackend;
use crate::session::{Role, SessionStore};
use crate::system::{format_interfaces, SystemOps};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use relay_common::BotConfig;
use std::sync::Arc;

/// Reply sent in place of a model answer when inference fails.
pub const AI_ERROR_REPLY: &str = "Internal AI error";

/// Acknowledgement sent before rebooting.
pub const REBOOT_ACK: &str = "Rebooting the system... please wait.";

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<think>\s*</think>|\s*<think>.*?</think>\s*").expect("valid think-block regex")
});

/// Remove `<think>...</think>` reasoning blocks and leading newlines from a model reply.
pub fn strip_reasoning(text: &str) -> String {
    let cleaned = THINK_BLOCK.replace_all(text, "");
    cleaned.trim_start_matches('\n').to_string()
}

/// Outbound half of the chat transport.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Deliver `text` to `correspondent`.
    async fn send_text(&self, correspondent: &str, text: &str) -> Result<(), SendError>;
}

/// Owner-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCommand {
    Help,
    Ip,
    Reboot,
    Status,
}

impl SystemCommand {
    /// Match a whole message against the reserved words, ignoring case.
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "help" => Some(Self::Help),
            "ip" => Some(Self::Ip),
            "reboot" => Some(Self::Reboot),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Ip => "ip",
            Self::Reboot => "reboot",
            Self::Status => "status",
        }
    }
}

/// What to do with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(SystemCommand),
    Converse { prompt: String },
    Relay { prompt: String },
    Ignore,
}

impl Route {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Converse { .. } => "converse",
            Self::Relay { .. } => "relay",
            Self::Ignore => "ignore",
        }
    }
}

/// Strip the relay secret and the single separator character after it.
///
/// Returns `None` when `text` does not start with `secret` or nothing follows
/// the separator.
pub fn strip_relay_secret<'a>(text: &'a str, secret: &str) -> Option<&'a str> {
    if secret.is_empty() {
        return None;
    }
    let rest = text.strip_prefix(secret)?;
    let mut chars = rest.chars();
    chars.next()?;
    let prompt = chars.as_str();
    if prompt.is_empty() {
        None
    } else {
        Some(prompt)
    }
}

/// Classifies inbound messages and carries out the result.
pub struct CommandRouter {
    config: Arc<BotConfig>,
    sessions: SessionStore,
    inference: Arc<dyn InferenceBackend>,
    system: Arc<dyn SystemOps>,
}

impl CommandRouter {
    pub fn new(
        config: Arc<BotConfig>,
        sessions: SessionStore,
        inference: Arc<dyn InferenceBackend>,
        system: Arc<dyn SystemOps>,
    ) -> Self {
        Self {
            config,
            sessions,
            inference,
            system,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Decide what `text` from `sender` means. Pure; no side effects.
    pub fn classify(&self, sender: &str, text: &str) -> Route {
        if sender == self.config.owner {
            return match SystemCommand::parse(text) {
                Some(cmd) => Route::Command(cmd),
                None => Route::Converse {
                    prompt: text.to_string(),
                },
            };
        }

        match strip_relay_secret(text, &self.config.relay_secret) {
            Some(prompt) => Route::Relay {
                prompt: prompt.to_string(),
            },
            None => Route::Ignore,
        }
    }

    /// Classify and execute one message, sending any replies through `sink`.
    pub async fn handle(&self, sender: &str, text: &str, sink: &dyn ReplySink) -> Route {
        let route = self.classify(sender, text);

        match &route {
            Route::Command(cmd) => self.run_command(*cmd, sender, sink).await,
            Route::Converse { prompt } => {
                tracing::info!(correspondent = %sender, "Owner request");
                self.converse(sender, prompt, sink).await;
            }
            Route::Relay { prompt } => {
                tracing::info!(correspondent = %sender, "Relay request");
                self.converse(sender, prompt, sink).await;
            }
            Route::Ignore => {
                tracing::debug!(correspondent = %sender, "Message ignored");
            }
        }

        route
    }

    /// One model round-trip on the sender's session.
    async fn converse(&self, correspondent: &str, prompt: &str, sink: &dyn ReplySink) {
        let (epoch, history) = self
            .sessions
            .append_and_snapshot(correspondent, Role::User, prompt);

        let reply = match self.inference.generate(&self.config.model, &history).await {
            Ok(raw) => {
                if !self
                    .sessions
                    .append_in(correspondent, epoch, Role::Assistant, raw.as_str())
                {
                    tracing::debug!(
                        correspondent = %correspondent,
                        "Session expired during inference, reply not recorded"
                    );
                }
                strip_reasoning(&raw)
            }
            Err(e) => {
                tracing::error!(
                    correspondent = %correspondent,
                    backend = %self.inference.name(),
                    transient = e.is_transient(),
                    error = %e,
                    "Inference failed"
                );
                AI_ERROR_REPLY.to_string()
            }
        };

        if reply.trim().is_empty() {
            tracing::warn!(correspondent = %correspondent, "Model reply is empty after cleanup, nothing sent");
            return;
        }

        send_logged(sink, correspondent, &reply).await;
    }

    async fn run_command(&self, cmd: SystemCommand, owner: &str, sink: &dyn ReplySink) {
        tracing::info!(command = cmd.as_str(), "System command");

        match cmd {
            SystemCommand::Help => {
                send_logged(sink, owner, &self.config.help_text).await;
            }
            SystemCommand::Ip => {
                let listing = match self.system.network_interfaces() {
                    Ok(ifaces) => format_interfaces(&ifaces),
                    Err(e) => {
                        tracing::warn!(error = %e, "Interface enumeration failed");
                        "Error getting interfaces".to_string()
                    }
                };
                send_logged(sink, owner, &listing).await;

                let lookup = match self.system.public_ip_info().await {
                    Ok(out) if out.trim().is_empty() => "IP lookup returned no output".to_string(),
                    Ok(out) => out,
                    Err(e) => {
                        tracing::warn!(error = %e, "IP lookup failed");
                        lookup_failure_text(&e)
                    }
                };
                send_logged(sink, owner, &lookup).await;
            }
            SystemCommand::Reboot => {
                send_logged(sink, owner, REBOOT_ACK).await;
                if let Err(e) = self.system.reboot().await {
                    tracing::error!(error = %e, "Reboot failed");
                }
            }
            SystemCommand::Status => {
                tracing::info!("Status request, ignoring");
            }
        }
    }
}

fn lookup_failure_text(e: &CommandError) -> String {
    format!("IP lookup failed: {e}")
}

async fn send_logged(sink: &dyn ReplySink, correspondent: &str, text: &str) {
    if let Err(e) = sink.send_text(correspondent, text).await {
        tracing::warn!(error = %e, "Reply not delivered");
    }
}
