//! End-to-end dispatch: inbound queue -> command router -> outbound channel.

use async_trait::async_trait;
use relay_bot::{
    CommandError, CommandRouter, InferenceBackend, InferenceError, InterfaceInfo, SessionStore,
    SystemOps, Turn,
};
use relay_channels::{
    Channel, ChannelMessage, ChannelResult, ChannelType, Dispatcher, MessageCallback,
    MessageContent, OutboundRouter, OutgoingMessage,
};
use relay_common::BotConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const OWNER: &str = "+393312345654";

struct EchoBackend;

#[async_trait]
impl InferenceBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, _model: &str, turns: &[Turn]) -> Result<String, InferenceError> {
        let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
        Ok(format!("<think>hmm</think>echo: {last}"))
    }
}

struct IdleSystem;

#[async_trait]
impl SystemOps for IdleSystem {
    fn network_interfaces(&self) -> Result<Vec<InterfaceInfo>, CommandError> {
        Ok(vec![])
    }

    async fn public_ip_info(&self) -> Result<String, CommandError> {
        Ok("{}".into())
    }

    async fn reboot(&self) -> Result<(), CommandError> {
        Ok(())
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl Outbox {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| (m.channel_id.clone(), m.text.clone()))
            .collect()
    }
}

#[async_trait]
impl Channel for Outbox {
    fn name(&self) -> &'static str {
        "outbox"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        self.sent.lock().unwrap().push(message);
        Ok("out-1".into())
    }

    async fn listen(&self, _callback: MessageCallback) -> ChannelResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

fn dispatcher(outbox: Arc<Outbox>) -> Arc<Dispatcher> {
    let config = BotConfig {
        owner: OWNER.into(),
        relay_secret: "open sesame".into(),
        ..BotConfig::default()
    };
    let router = CommandRouter::new(
        Arc::new(config),
        SessionStore::new(Duration::from_secs(3600)),
        Arc::new(EchoBackend),
        Arc::new(IdleSystem),
    );
    let outbound = OutboundRouter::new().with_channel(ChannelType::WhatsApp, outbox);
    Arc::new(Dispatcher::new(Arc::new(router), outbound))
}

async fn wait_for(outbox: &Outbox, count: usize) -> Vec<(String, String)> {
    for _ in 0..200 {
        let sent = outbox.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    outbox.sent()
}

#[tokio::test]
async fn owner_message_is_answered_on_same_channel() {
    let outbox = Arc::new(Outbox::default());
    let dispatcher = dispatcher(outbox.clone());

    dispatcher
        .process(ChannelMessage::text(ChannelType::WhatsApp, "m1", OWNER, "hi"))
        .await;

    assert_eq!(outbox.sent(), vec![(OWNER.to_string(), "echo: hi".to_string())]);
    assert_eq!(dispatcher.router().sessions().snapshot(OWNER).len(), 2);
}

#[tokio::test]
async fn non_text_messages_are_ignored() {
    let outbox = Arc::new(Outbox::default());
    let dispatcher = dispatcher(outbox.clone());

    let mut msg = ChannelMessage::text(ChannelType::WhatsApp, "m1", OWNER, "");
    msg.content = MessageContent::Unsupported {
        kind: "sticker".into(),
    };
    dispatcher.process(msg).await;

    assert!(outbox.sent().is_empty());
    assert!(dispatcher.router().sessions().is_empty());
}

#[tokio::test]
async fn processor_handles_each_message_in_its_own_task() {
    let outbox = Arc::new(Outbox::default());
    let dispatcher = dispatcher(outbox.clone());
    let (tx, rx) = mpsc::channel(16);
    let processor = Dispatcher::spawn_processor(dispatcher.clone(), rx);

    tx.send(ChannelMessage::text(ChannelType::WhatsApp, "1", OWNER, "one"))
        .await
        .unwrap();
    tx.send(ChannelMessage::text(
        ChannelType::WhatsApp,
        "2",
        "+15550100",
        "open sesame two",
    ))
    .await
    .unwrap();
    tx.send(ChannelMessage::text(ChannelType::WhatsApp, "3", "+15550199", "three"))
        .await
        .unwrap();

    let mut sent = wait_for(&outbox, 2).await;
    sent.sort();
    assert_eq!(
        sent,
        vec![
            ("+15550100".to_string(), "echo: two".to_string()),
            (OWNER.to_string(), "echo: one".to_string()),
        ]
    );
    assert!(!dispatcher.router().sessions().contains("+15550199"));

    drop(tx);
    tokio::time::timeout(Duration::from_secs(1), processor)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn enqueue_callback_feeds_the_queue() {
    let (tx, mut rx) = mpsc::channel(1);
    let callback = Dispatcher::enqueue_callback(tx);

    callback(ChannelMessage::text(ChannelType::Cli, "1", OWNER, "a"));
    // Queue is full; this one is dropped rather than blocking
    callback(ChannelMessage::text(ChannelType::Cli, "2", OWNER, "b"));

    assert_eq!(rx.recv().await.unwrap().text_content(), Some("a"));
    assert!(rx.try_recv().is_err());
}
