//! CLI channel adapter for interactive terminal sessions.
//!
//! Typed lines are attributed to a single fixed identity; replies are
//! printed to stdout. Handy for talking to the bot without a phone.

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelResult, MessageCallback};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, BufReader};

/// CLI channel - stdin/stdout.
pub struct CliChannel {
    identity: String,
}

/// What a single stdin line means.
#[derive(Debug)]
pub enum CliInput {
    Message(ChannelMessage),
    Quit,
    Blank,
}

impl CliChannel {
    /// Create a CLI channel whose lines come from `identity`.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Turn one raw line into a message, a quit request, or nothing.
    pub fn parse_line(&self, line: &str) -> CliInput {
        let line = line.trim();
        if line.is_empty() {
            return CliInput::Blank;
        }
        if line == "/quit" || line == "/exit" {
            return CliInput::Quit;
        }

        CliInput::Message(ChannelMessage::text(
            ChannelType::Cli,
            uuid::Uuid::new_v4().to_string(),
            self.identity.clone(),
            line,
        ))
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        println!("{}", message.text);
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn listen(&self, callback: MessageCallback) -> ChannelResult<()> {
        let reader = BufReader::new(io::stdin());
        let mut lines = reader.lines();

        tracing::info!(identity = %self.identity, "CLI channel reading stdin (/quit to stop)");

        while let Ok(Some(line)) = lines.next_line().await {
            match self.parse_line(&line) {
                CliInput::Message(msg) => callback(msg),
                CliInput::Quit => break,
                CliInput::Blank => {}
            }
        }

        tracing::info!("CLI input closed");
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}
