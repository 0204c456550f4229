/// Polls the configured channels and turns new messages into commands or
/// routed replies.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use freedns_bot_core::config::DiscordConfig;
use freedns_bot_core::{BotError, UserId};

use crate::command::BotCommand;
use crate::discord::{DiscordHttp, DiscordMessage};
use crate::router::ReplyRouter;

const FETCH_LIMIT: u8 = 50;

/// A command (or a failed attempt at one) from an operator
#[derive(Debug)]
pub struct Inbound {
    pub channel_id: String,
    pub author: UserId,
    pub author_name: String,
    pub command: Result<BotCommand, BotError>,
}

pub struct Gateway {
    http: Arc<DiscordHttp>,
    router: Arc<ReplyRouter>,
    channel_ids: Vec<String>,
    prefix: String,
    poll_interval: Duration,
    bot_user_id: String,
}

impl Gateway {
    pub fn new(
        http: Arc<DiscordHttp>,
        router: Arc<ReplyRouter>,
        config: &DiscordConfig,
        bot_user_id: String,
    ) -> Self {
        Self {
            http,
            router,
            channel_ids: config.channel_ids.clone(),
            prefix: config.command_prefix.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(250)),
            bot_user_id,
        }
    }

    /// Poll until `shutdown` flips or the receiving side goes away.
    /// Only messages posted after the gateway started are considered.
    pub async fn run(self, commands: mpsc::Sender<Inbound>, mut shutdown: watch::Receiver<bool>) {
        let mut cursors: HashMap<String, String> = HashMap::new();
        info!("gateway polling {} channel(s)", self.channel_ids.len());

        loop {
            for channel_id in &self.channel_ids {
                let Some(after) = cursors.get(channel_id).cloned() else {
                    match self.latest_message_id(channel_id).await {
                        Ok(latest) => {
                            debug!("channel {} starts after {}", channel_id, latest);
                            cursors.insert(channel_id.clone(), latest);
                        }
                        Err(e) => warn!("cannot read channel {}: {}", channel_id, e),
                    }
                    continue;
                };

                let messages = match self.http.fetch_messages(channel_id, Some(&after), FETCH_LIMIT).await {
                    Ok(messages) => messages,
                    Err(e) => {
                        warn!("polling channel {} failed: {}", channel_id, e);
                        continue;
                    }
                };

                for message in messages {
                    cursors.insert(channel_id.clone(), message.id.clone());
                    let Some(inbound) = route_message(&self.router, &self.prefix, &self.bot_user_id, message)
                    else {
                        continue;
                    };
                    if commands.send(inbound).await.is_err() {
                        info!("command receiver closed, stopping gateway");
                        return;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("gateway shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn latest_message_id(&self, channel_id: &str) -> Result<String, BotError> {
        let latest = self.http.fetch_messages(channel_id, None, 1).await?;
        // An empty channel starts from snowflake zero
        Ok(latest.last().map(|m| m.id.clone()).unwrap_or_else(|| "0".to_string()))
    }
}

/// Decide what a message is. `!cancel` always reaches the dispatcher;
/// anything else from a user with a pending reply wait answers that wait.
pub fn route_message(
    router: &ReplyRouter,
    prefix: &str,
    bot_user_id: &str,
    message: DiscordMessage,
) -> Option<Inbound> {
    if message.author.bot || message.author.id == bot_user_id {
        return None;
    }

    let parsed = BotCommand::parse(prefix, &message.content);
    let is_cancel = matches!(parsed, Ok(Some(BotCommand::Cancel)));

    if !is_cancel && router.deliver(&message.channel_id, &message.author.id, message.content.clone()) {
        return None;
    }

    let command = match parsed {
        Ok(Some(command)) => Ok(command),
        Ok(None) => return None,
        Err(e) => Err(e),
    };

    Some(Inbound {
        channel_id: message.channel_id,
        author: message.author.id,
        author_name: message.author.username,
        command,
    })
}
