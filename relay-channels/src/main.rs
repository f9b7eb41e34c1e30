//! relaybot - chat-to-Ollama relay bot.

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use relay_common::config::Config;
use relay_common::logging::init_logging;
use relay_common::util::{normalize_phone, parse_duration_secs};
use std::path::PathBuf;

/// Relay chat messages to a local Ollama model.
#[derive(Parser, Debug)]
#[command(name = "relaybot")]
#[command(version)]
#[command(about = "Chat relay bot backed by a local Ollama model.", long_about = None)]
struct Args {
    /// Config file (default: ~/.relaybot/config.json)
    #[arg(long, env = "RELAYBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Owner identity (phone number for WhatsApp)
    #[arg(long)]
    number: Option<String>,

    /// Shared secret that lets non-owners relay prompts
    #[arg(long)]
    password: Option<String>,

    /// Ollama model name
    #[arg(long)]
    model: Option<String>,

    /// Idle time before a conversation is forgotten (e.g. 3600, 30m, 1h)
    #[arg(long, value_parser = parse_duration_secs)]
    idle_timeout: Option<u64>,

    /// Run only this channel
    #[arg(long, value_enum)]
    channel: Option<ChannelArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ChannelArg {
    Whatsapp,
    Cli,
}

/// Flags win over file and environment values.
fn apply_args(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(number) = &args.number {
        config.bot.owner.clone_from(number);
    }
    if let Some(password) = &args.password {
        config.bot.relay_secret.clone_from(password);
    }
    if let Some(model) = &args.model {
        config.bot.model.clone_from(model);
    }
    if let Some(secs) = args.idle_timeout {
        config.bot.idle_timeout_secs = secs;
    }

    match args.channel {
        Some(ChannelArg::Whatsapp) => {
            let Some(wa) = config.channels.whatsapp.as_mut() else {
                bail!("--channel whatsapp needs a channels.whatsapp section in the config file");
            };
            wa.enabled = true;
            config.channels.cli.enabled = false;
        }
        Some(ChannelArg::Cli) => {
            config.channels.cli.enabled = true;
            if let Some(wa) = config.channels.whatsapp.as_mut() {
                wa.enabled = false;
            }
        }
        None => {}
    }

    // WhatsApp reports senders as +digits
    if config.whatsapp_enabled() {
        if let Some(owner) = normalize_phone(&config.bot.owner) {
            config.bot.owner = owner;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_with_env(args.config.as_deref())?;
    apply_args(&mut config, &args)?;
    config.validate()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        owner = %config.bot.owner,
        relay = config.bot.relay_enabled(),
        "relaybot starting"
    );

    relay_channels::run(config).await
}
