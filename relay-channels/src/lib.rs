//! Relay Channels - chat transports and service wiring for relaybot.
//!
//! This crate provides:
//! - Unified message types and the [`Channel`] adapter trait
//! - WhatsApp Business Cloud API and CLI adapters
//! - Outbound routing of replies to the originating channel
//! - axum webhook and health routes
//! - The dispatcher that runs one task per inbound message

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod dispatcher;
pub mod message;
pub mod outbound;
pub mod routes;
pub mod traits;
pub mod whatsapp;

pub use cli::{CliChannel, CliInput};
pub use dispatcher::Dispatcher;
pub use message::{ChannelMessage, ChannelType, MessageContent, OutgoingMessage};
pub use outbound::{OutboundRouter, ReplyTarget};
pub use routes::{build_router, create_state, verify_whatsapp_signature, ChannelsState};
pub use traits::{Channel, ChannelError, ChannelResult, MessageCallback};
pub use whatsapp::WhatsAppChannel;

use relay_bot::{CommandRouter, HostSystem, OllamaClient, SessionStore};
use relay_common::error::ResultExt;
use relay_common::{Config, Error};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum accepted webhook body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Per-request deadline for the HTTP routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes plus the body-size and timeout middleware.
pub fn build_http_router(state: Arc<ChannelsState>) -> axum::Router {
    build_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}

/// Build the command router (sessions, Ollama client, host commands) from config.
pub fn build_command_router(config: &Config) -> Arc<CommandRouter> {
    let sessions = SessionStore::new(config.bot.idle_timeout());
    let inference = Arc::new(OllamaClient::from_config(&config.ollama));
    let system = Arc::new(HostSystem::from_config(&config.system));

    Arc::new(CommandRouter::new(
        Arc::new(config.bot.clone()),
        sessions,
        inference,
        system,
    ))
}

/// Run the bot until Ctrl-C, or until CLI input ends when the CLI is the only channel.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let whatsapp_config = config.channels.whatsapp.as_ref().filter(|w| w.enabled);
    let cli_enabled = config.channels.cli.enabled;

    if whatsapp_config.is_none() && !cli_enabled {
        return Err(Error::Config("no channel enabled (whatsapp or cli)".into()).into());
    }

    let addr: SocketAddr = format!("{}:{}", config.channels.host, config.channels.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address: {e}")))?;

    let command_router = build_command_router(&config);
    let mut outbound = OutboundRouter::new();

    let whatsapp = match whatsapp_config {
        Some(wa) => {
            let mut channel = WhatsAppChannel::from_config(wa);
            if let Err(e) = channel.init().await {
                tracing::warn!(error = %e, "WhatsApp token check failed; continuing");
            }
            let channel = Arc::new(channel);
            outbound = outbound.with_channel(ChannelType::WhatsApp, channel.clone());
            Some((channel, wa.app_secret.clone()))
        }
        None => None,
    };

    let cli = cli_enabled.then(|| {
        let identity = config
            .channels
            .cli
            .identity
            .clone()
            .unwrap_or_else(|| config.bot.owner.clone());
        Arc::new(CliChannel::new(identity))
    });
    if let Some(cli) = &cli {
        outbound = outbound.with_channel(ChannelType::Cli, cli.clone());
    }

    let (whatsapp_channel, app_secret) = match whatsapp {
        Some((channel, secret)) => (Some(channel), secret),
        None => (None, None),
    };
    let (state, rx) = create_state(
        whatsapp_channel.clone(),
        app_secret,
        command_router.sessions().clone(),
    );

    let dispatcher = Arc::new(Dispatcher::new(command_router, outbound.clone()));
    let processor = Dispatcher::spawn_processor(dispatcher, rx);

    let cli_task = cli.map(|cli| {
        let callback = Dispatcher::enqueue_callback(state.message_tx.clone());
        tokio::spawn(async move {
            if let Err(e) = cli.listen(callback).await {
                tracing::error!(error = %e, "CLI channel failed");
            }
        })
    });
    if let Some(wa) = &whatsapp_channel {
        if let Err(e) = wa.listen(Dispatcher::enqueue_callback(state.message_tx.clone())).await {
            tracing::warn!(error = %e, "WhatsApp listener failed");
        }
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("binding {addr}"))?;
    tracing::info!(%addr, model = %config.bot.model, "relaybot listening");

    let app = build_http_router(state);
    // CLI-only runs end when stdin does
    let cli_only = whatsapp_channel.is_none();

    let shutdown = async move {
        match cli_task {
            Some(task) if cli_only => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = task => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        tracing::info!("Shutting down");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving HTTP")?;

    outbound.shutdown_all().await;
    processor.abort();
    Ok(())
}
