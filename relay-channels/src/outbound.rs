//! Outbound message routing.
//!
//! Maps a reply back onto the channel the conversation arrived on.

use crate::message::{ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use relay_bot::{ReplySink, SendError};
use std::collections::HashMap;
use std::sync::Arc;

/// Routes outgoing messages to the appropriate channel.
#[derive(Default, Clone)]
pub struct OutboundRouter {
    channels: HashMap<ChannelType, Arc<dyn Channel>>,
}

impl OutboundRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the channel serving `channel_type`.
    pub fn with_channel(mut self, channel_type: ChannelType, channel: Arc<dyn Channel>) -> Self {
        self.channels.insert(channel_type, channel);
        self
    }

    pub fn has_channel(&self, channel_type: ChannelType) -> bool {
        self.channels.contains_key(&channel_type)
    }

    /// Send a message to its channel.
    pub async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let Some(channel) = self.channels.get(&message.channel_type) else {
            return Err(ChannelError::Internal(format!(
                "{} channel not configured",
                message.channel_type.as_str()
            )));
        };

        channel.send(message).await
    }

    /// A [`ReplySink`] bound to one channel.
    pub fn reply_target(&self, channel_type: ChannelType) -> ReplyTarget {
        ReplyTarget {
            router: self.clone(),
            channel_type,
        }
    }

    /// Shut every registered channel down, logging failures.
    pub async fn shutdown_all(&self) {
        for channel in self.channels.values() {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
    }
}

/// Reply sink for the conversation a message came from.
pub struct ReplyTarget {
    router: OutboundRouter,
    channel_type: ChannelType,
}

#[async_trait]
impl ReplySink for ReplyTarget {
    async fn send_text(&self, correspondent: &str, text: &str) -> Result<(), SendError> {
        let message = OutgoingMessage {
            channel_type: self.channel_type,
            channel_id: correspondent.to_string(),
            text: text.to_string(),
        };

        self.router
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| SendError::new(correspondent, e.to_string()))
    }
}
