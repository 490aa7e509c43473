mod activation;
mod bus;
mod classifier;
mod commands;
mod config;
mod consumer;
mod platform;
mod processor;
mod responder;
mod router;
mod store;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::BotCommands;
use crate::config::Config;
use crate::platform::telegram::TelegramSender;
use crate::platform::DirectReply;
use crate::processor::BusProcessor;
use crate::responder::Responder;
use crate::router::Router;
use crate::store::{SqliteUserStore, UserStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telegram_gate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Database: {}", config.database.path.display());
    info!("  Bus backend: {}", config.bus.backend);
    info!("  Inbound topic: {}", config.bus.inbound_topic);
    info!("  Outbound topic: {}", config.bus.outbound_topic);

    let store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::open(&config.database.path)?);
    let bus = bus::build(&config.bus).await?;

    let bot = teloxide::Bot::new(&config.telegram.bot_token);
    let sender: Arc<dyn DirectReply> = Arc::new(TelegramSender::new(bot.clone()));

    let responder = Responder::new(bus.bus.clone(), Some(sender.clone()));
    let commands = Arc::new(BotCommands::new(responder.clone()));

    let processor = Arc::new(BusProcessor::new(
        store.clone(),
        commands.clone(),
        responder.clone(),
    ));
    let router = Arc::new(Router::new(
        store,
        bus.bus.clone(),
        commands,
        responder,
        sender.clone(),
    ));

    tokio::spawn(consumer::run(bus.deliveries, processor, sender));

    info!("Bot is starting...");
    platform::telegram::run(bot, router).await?;

    Ok(())
}
