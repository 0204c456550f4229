use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use freedns_bot_channel::{DiscordChannel, DiscordHttp, Gateway, ReplyRouter};
use freedns_bot_core::{AppConfig, InteractiveChannel};
use freedns_bot_registration::{
    CaptchaRelay, FreeDnsConnector, OrchestratorConfig, RegistrationOrchestrator, SessionRegistry,
    SmailProClient,
};

use crate::commands::Dispatcher;

/// Connect to Discord and serve commands until Ctrl-C
pub async fn run_bot(config: AppConfig, token: String) -> Result<()> {
    if config.discord.channel_ids.is_empty() {
        bail!("no Discord channels configured (discord.channel_ids or DISCORD_CHANNEL_IDS)");
    }

    let http = Arc::new(DiscordHttp::new(&config.discord, &token)?);
    let me = http
        .current_user()
        .await
        .context("failed to authenticate with Discord")?;
    info!("✅ Logged in as {}", me.username);

    let router = Arc::new(ReplyRouter::new());
    let orchestrator = RegistrationOrchestrator::new(
        OrchestratorConfig::from(&config),
        Arc::new(FreeDnsConnector::new(config.registrar.clone())),
        Arc::new(SmailProClient::new(&config.mailbox)?),
        CaptchaRelay::new(config.reply_timeout()),
    );

    let dispatcher = {
        let http = http.clone();
        let router = router.clone();
        Dispatcher::new(
            Arc::new(orchestrator),
            Arc::new(SessionRegistry::new()),
            Box::new(move |channel_id: &str| {
                Arc::new(DiscordChannel::new(channel_id.to_string(), http.clone(), router.clone()))
                    as Arc<dyn InteractiveChannel>
            }),
        )
    };

    let (command_tx, mut command_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let gateway = Gateway::new(http, router, &config.discord, me.id);
    let gateway_handle = tokio::spawn(gateway.run(command_tx, shutdown_rx));

    loop {
        tokio::select! {
            inbound = command_rx.recv() => match inbound {
                Some(inbound) => dispatcher.handle(inbound).await,
                None => {
                    warn!("gateway stopped");
                    break;
                }
            },
            _ = signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = gateway_handle.await {
        warn!("gateway task failed: {}", e);
    }

    Ok(())
}
