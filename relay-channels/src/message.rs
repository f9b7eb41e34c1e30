//! Message types for channel communication.

use serde::{Deserialize, Serialize};

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    WhatsApp,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Cli => "cli",
        }
    }
}

/// Unified inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Conversation the message belongs to; replies go here
    pub channel_id: String,
    /// Author of the message
    pub user_id: String,
    /// Message content
    pub content: MessageContent,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID assigned on arrival
    pub trace_id: String,
}

/// Message content types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message
    Text { text: String },
    /// Anything the bot does not read (images, voice, reactions...)
    Unsupported { kind: String },
}

impl ChannelMessage {
    /// Build a text message stamped with the current time and a fresh trace ID.
    pub fn text(
        channel_type: ChannelType,
        id: impl Into<String>,
        correspondent: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let correspondent = correspondent.into();
        Self {
            id: id.into(),
            channel_type,
            channel_id: correspondent.clone(),
            user_id: correspondent,
            content: MessageContent::Text { text: text.into() },
            timestamp: chrono::Utc::now().timestamp_millis(),
            trace_id: relay_common::logging::generate_trace_id(),
        }
    }

    /// Get the text content if this is a text message.
    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::Unsupported { .. } => None,
        }
    }

    /// Correspondent identity used for sessions and replies.
    pub fn correspondent(&self) -> &str {
        &self.channel_id
    }
}

/// Outgoing message to send to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel type
    pub channel_type: ChannelType,
    /// Target channel ID
    pub channel_id: String,
    /// Text body
    pub text: String,
}
