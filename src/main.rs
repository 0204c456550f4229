mod bot;
mod cli;
mod commands;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::warn;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use freedns_bot_core::config::{AppConfig, TOKEN_ENV};

use crate::bot::run_bot;
use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::ExtractCode { file } => commands::extract_code::run(&file)?,
        Commands::Run => {
            let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()) else {
                println!("❌ Please set DISCORD_TOKEN as an environment variable!");
                bail!("{} is not set", TOKEN_ENV);
            };

            let config = load_config(&cli.config)?;
            run_bot(config, token).await?;
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<AppConfig> {
    let config_str = std::fs::read_to_string(path).unwrap_or_else(|_| {
        warn!(path = %path, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config = AppConfig::from_toml(&config_str)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Environment variable overrides on top of the config file.
/// Unparseable values are ignored with a warning.
fn apply_env_overrides(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DISCORD_CHANNEL_IDS") {
        config.discord.channel_ids = v
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = var("CAPTCHA_RETRIES") {
        match v.parse::<u32>() {
            Ok(n) if n > 0 => config.captcha.max_retries = n,
            _ => warn!(value = %v, "ignoring CAPTCHA_RETRIES"),
        }
    }
    if let Some(v) = var("ACTIVATION_TIMEOUT_SECONDS") {
        match v.parse::<u64>() {
            Ok(n) if n > 0 => config.mailbox.activation_timeout_seconds = n,
            _ => warn!(value = %v, "ignoring ACTIVATION_TIMEOUT_SECONDS"),
        }
    }
    if let Some(v) = var("MAILBOX_DOMAIN") {
        let domain = v.trim();
        if !domain.is_empty() {
            config.mailbox.domain = domain.to_string();
        }
    }
}
