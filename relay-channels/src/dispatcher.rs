//! Inbound dispatch: one task per transport event.

use crate::message::ChannelMessage;
use crate::outbound::OutboundRouter;
use crate::traits::MessageCallback;
use relay_bot::CommandRouter;
use relay_common::util::truncate_with_ellipsis;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Feeds inbound messages into the command router and sends replies back
/// over the originating channel.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<CommandRouter>,
    outbound: OutboundRouter,
}

impl Dispatcher {
    pub fn new(router: Arc<CommandRouter>, outbound: OutboundRouter) -> Self {
        Self { router, outbound }
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Handle one inbound message to completion.
    pub async fn process(&self, message: ChannelMessage) {
        let span = tracing::info_span!(
            "inbound",
            trace_id = %message.trace_id,
            channel = message.channel_type.as_str(),
            from = %message.correspondent(),
        );

        async {
            let Some(text) = message.text_content() else {
                tracing::debug!(message_id = %message.id, "Ignoring non-text message");
                return;
            };

            tracing::debug!(text = %truncate_with_ellipsis(text, 50), "Message received");

            let sink = self.outbound.reply_target(message.channel_type);
            let route = self
                .router
                .handle(message.correspondent(), text, &sink)
                .await;

            tracing::debug!(route = route.kind(), "Message handled");
        }
        .instrument(span)
        .await;
    }

    /// Drain `rx`, spawning a task per message. Returns when every sender is gone.
    pub fn spawn_processor(
        dispatcher: Arc<Self>,
        mut rx: mpsc::Receiver<ChannelMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Dispatcher started");

            while let Some(message) = rx.recv().await {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.process(message).await;
                });
            }

            tracing::info!("Dispatcher stopped");
        })
    }

    /// Callback for pull-based channels that enqueues onto `tx`.
    ///
    /// A full queue drops the message with a warning instead of blocking the reader.
    pub fn enqueue_callback(tx: mpsc::Sender<ChannelMessage>) -> MessageCallback {
        Arc::new(move |message: ChannelMessage| {
            if let Err(e) = tx.try_send(message) {
                tracing::warn!(error = %e, "Dropping inbound message");
            }
        })
    }
}
