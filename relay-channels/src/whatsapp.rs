//! WhatsApp channel.
//!
//! Uses the WhatsApp Business Cloud API. Inbound messages arrive via
//! webhook (push-based), outbound messages go through the Graph API.

use crate::message::{ChannelMessage, ChannelType, MessageContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult, MessageCallback};
use async_trait::async_trait;
use relay_common::util::normalize_phone;
use relay_common::WhatsAppConfig;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};

/// WhatsApp channel using Business Cloud API.
pub struct WhatsAppChannel {
    access_token: String,
    phone_number_id: String,
    verify_token: Option<String>,
    api_base_url: String,
    client: Client,
    connected: AtomicBool,
}

impl WhatsAppChannel {
    /// Create a new WhatsApp channel.
    pub fn new(
        access_token: String,
        phone_number_id: String,
        verify_token: Option<String>,
        api_base_url: &str,
    ) -> Self {
        Self {
            access_token,
            phone_number_id,
            verify_token,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &WhatsAppConfig) -> Self {
        Self::new(
            config.access_token.clone(),
            config.phone_number_id.clone(),
            config.verify_token.clone(),
            &config.api_base_url,
        )
    }

    /// Get the verify token for webhook verification, if one is configured.
    pub fn verify_token(&self) -> Option<&str> {
        self.verify_token.as_deref()
    }

    /// Whether `init` succeeded and `shutdown` has not run.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn phone_url(&self) -> String {
        format!("{}/{}", self.api_base_url, self.phone_number_id)
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.phone_url())
    }

    /// Parse an incoming webhook payload and extract messages.
    ///
    /// Status callbacks and entries without a sender are skipped. Non-text
    /// messages are returned with [`MessageContent::Unsupported`].
    pub fn parse_webhook_payload(&self, payload: &serde_json::Value) -> Vec<ChannelMessage> {
        let mut messages = Vec::new();

        let Some(entries) = payload.get("entry").and_then(|e| e.as_array()) else {
            return messages;
        };

        for entry in entries {
            let Some(changes) = entry.get("changes").and_then(|c| c.as_array()) else {
                continue;
            };

            for change in changes {
                let Some(msgs) = change
                    .get("value")
                    .and_then(|v| v.get("messages"))
                    .and_then(|m| m.as_array())
                else {
                    continue;
                };

                for msg in msgs {
                    if let Some(parsed) = Self::parse_message(msg) {
                        messages.push(parsed);
                    }
                }
            }
        }

        messages
    }

    fn parse_message(msg: &serde_json::Value) -> Option<ChannelMessage> {
        let from = msg.get("from").and_then(|f| f.as_str())?;
        let Some(sender) = normalize_phone(from) else {
            tracing::debug!("WhatsApp: skipping message with unusable sender {from:?}");
            return None;
        };

        let kind = msg.get("type").and_then(|t| t.as_str()).unwrap_or("text");
        let content = match msg.get("text").and_then(|t| t.get("body")).and_then(|b| b.as_str()) {
            Some(body) if kind == "text" => MessageContent::Text {
                text: body.to_string(),
            },
            _ => MessageContent::Unsupported {
                kind: kind.to_string(),
            },
        };

        let timestamp = msg
            .get("timestamp")
            .and_then(|t| t.as_str())
            .and_then(|t| t.parse::<i64>().ok())
            .map(|ts| ts * 1000)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let id = msg
            .get("id")
            .and_then(|i| i.as_str())
            .unwrap_or("unknown")
            .to_string();

        Some(ChannelMessage {
            id,
            channel_type: ChannelType::WhatsApp,
            channel_id: sender.clone(),
            user_id: sender,
            content,
            timestamp,
            trace_id: relay_common::logging::generate_trace_id(),
        })
    }

    async fn fetch_phone_info(&self) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .get(self.phone_url())
            .bearer_auth(&self.access_token)
            .send()
            .await
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        let resp = self
            .fetch_phone_info()
            .await
            .map_err(|e| ChannelError::Auth(format!("Failed to verify WhatsApp token: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!(
                "WhatsApp auth failed ({status}): {error}"
            )));
        }

        self.connected.store(true, Ordering::Relaxed);
        tracing::info!(phone_number_id = %self.phone_number_id, "WhatsApp channel initialized");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        // The Graph API wants the number without the leading +
        let to = message
            .channel_id
            .strip_prefix('+')
            .unwrap_or(&message.channel_id);

        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": message.text
            }
        });

        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("WhatsApp send error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "WhatsApp API error ({status}): {error}"
            )));
        }

        let result: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Internal(format!("Failed to parse response: {e}")))?;

        let message_id = result
            .get("messages")
            .and_then(|m| m.as_array())
            .and_then(|arr| arr.first())
            .and_then(|msg| msg.get("id"))
            .and_then(|id| id.as_str())
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!(to = %message.channel_id, %message_id, "WhatsApp message sent");
        Ok(message_id)
    }

    async fn listen(&self, _callback: MessageCallback) -> ChannelResult<()> {
        tracing::info!(
            "WhatsApp channel active (webhook mode). \
            Point the Meta webhook at /webhook/whatsapp."
        );
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let resp = self
            .fetch_phone_info()
            .await
            .map_err(|e| ChannelError::Connection(format!("Health check failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::Auth("WhatsApp authentication failed".into()))
        }
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        self.connected.store(false, Ordering::Relaxed);
        tracing::info!("WhatsApp channel shutdown");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_channel() -> WhatsAppChannel {
        WhatsAppChannel::new(
            "test-token".into(),
            "123456789".into(),
            Some("verify-me".into()),
            "https://graph.example.com/v18.0/",
        )
    }

    fn payload_with(messages: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": { "messages": messages }
                }]
            }]
        })
    }

    #[test]
    fn whatsapp_channel_name() {
        assert_eq!(make_channel().name(), "whatsapp");
    }

    #[test]
    fn whatsapp_urls_trim_trailing_slash() {
        let ch = make_channel();
        assert_eq!(
            ch.messages_url(),
            "https://graph.example.com/v18.0/123456789/messages"
        );
        assert_eq!(ch.verify_token(), Some("verify-me"));
        assert!(!ch.is_connected());
    }

    #[test]
    fn whatsapp_parse_empty_payload() {
        let msgs = make_channel().parse_webhook_payload(&serde_json::json!({}));
        assert!(msgs.is_empty());
    }

    #[test]
    fn whatsapp_parse_valid_text_message() {
        let payload = payload_with(serde_json::json!([{
            "from": "1234567890",
            "id": "wamid.xxx",
            "timestamp": "1699999999",
            "type": "text",
            "text": { "body": "Hello!" }
        }]));

        let msgs = make_channel().parse_webhook_payload(&payload);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].user_id, "+1234567890");
        assert_eq!(msgs[0].correspondent(), "+1234567890");
        assert_eq!(msgs[0].id, "wamid.xxx");
        assert_eq!(msgs[0].timestamp, 1_699_999_999_000);
        assert_eq!(msgs[0].text_content(), Some("Hello!"));
    }

    #[test]
    fn whatsapp_parse_keeps_every_sender() {
        let payload = payload_with(serde_json::json!([
            { "from": "111", "type": "text", "text": { "body": "a" } },
            { "from": "+222", "type": "text", "text": { "body": "b" } }
        ]));

        let msgs = make_channel().parse_webhook_payload(&payload);
        let senders: Vec<_> = msgs.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(senders, vec!["+111", "+222"]);
        assert_ne!(msgs[0].trace_id, msgs[1].trace_id);
    }

    #[test]
    fn whatsapp_parse_non_text_is_unsupported() {
        let payload = payload_with(serde_json::json!([{
            "from": "1234567890",
            "type": "image",
            "image": { "id": "media-1" }
        }]));

        let msgs = make_channel().parse_webhook_payload(&payload);
        assert_eq!(msgs.len(), 1);
        assert!(matches!(
            &msgs[0].content,
            MessageContent::Unsupported { kind } if kind == "image"
        ));
    }

    #[test]
    fn whatsapp_parse_skips_status_updates() {
        let payload = serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{ "id": "wamid.1", "status": "delivered" }]
                    }
                }]
            }]
        });

        assert!(make_channel().parse_webhook_payload(&payload).is_empty());
    }
}
