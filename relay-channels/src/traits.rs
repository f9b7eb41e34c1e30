//! Channel traits for implementing transport adapters.

use crate::message::{ChannelMessage, OutgoingMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Callback invoked for every inbound message.
pub type MessageCallback = Arc<dyn Fn(ChannelMessage) + Send + Sync>;

/// Channel adapter trait.
///
/// Implement this trait to add support for a new messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Initialize the channel (verify credentials, etc.).
    async fn init(&mut self) -> ChannelResult<()>;

    /// Send a message; returns the transport's message ID.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Deliver inbound messages to `callback` until the source is exhausted.
    ///
    /// Push-based channels (webhooks) return immediately; their messages
    /// arrive through the HTTP routes instead.
    async fn listen(&self, callback: MessageCallback) -> ChannelResult<()>;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> ChannelResult<()>;

    /// Shutdown the channel gracefully.
    async fn shutdown(&self) -> ChannelResult<()>;
}
