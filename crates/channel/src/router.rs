use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use freedns_bot_core::{BotError, UserId};

type RouteKey = (String, UserId);

/// Hands incoming chat messages to whoever is waiting on a reply from that
/// user in that channel. One outstanding wait per (channel, user).
#[derive(Default)]
pub struct ReplyRouter {
    pending: DashMap<RouteKey, oneshot::Sender<String>>,
}

impl ReplyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the (channel, user) route. A live claim by someone else is an
    /// error; a stale one left by a dropped waiter is replaced.
    pub fn register(
        &self,
        channel_id: &str,
        user: &UserId,
    ) -> Result<oneshot::Receiver<String>, BotError> {
        let (tx, rx) = oneshot::channel();
        match self.pending.entry((channel_id.to_string(), user.clone())) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_closed() {
                    return Err(BotError::Channel(format!(
                        "already waiting for a reply from {} in {}",
                        user, channel_id
                    )));
                }
                occupied.insert(tx);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(tx);
            }
        }
        Ok(rx)
    }

    /// Give `text` to the waiter for this route. Returns false if nobody
    /// was waiting, in which case the caller keeps the message.
    pub fn deliver(&self, channel_id: &str, user: &UserId, text: String) -> bool {
        let Some((_, tx)) = self.pending.remove(&(channel_id.to_string(), user.clone())) else {
            return false;
        };
        let delivered = tx.send(text).is_ok();
        debug!(user = %user, channel = channel_id, delivered, "routed reply");
        delivered
    }

    pub fn is_waiting(&self, channel_id: &str, user: &UserId) -> bool {
        self.pending
            .get(&(channel_id.to_string(), user.clone()))
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Drop the route; the waiter sees `None`
    pub fn cancel(&self, channel_id: &str, user: &UserId) -> bool {
        self.pending
            .remove(&(channel_id.to_string(), user.clone()))
            .is_some()
    }

    /// Wait up to `timeout` for the next message routed to (channel, user)
    pub async fn wait(
        &self,
        channel_id: &str,
        user: &UserId,
        timeout: Duration,
    ) -> Result<Option<String>, BotError> {
        let rx = self.register(channel_id, user)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(text)) => Ok(Some(text)),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                self.pending.remove(&(channel_id.to_string(), user.clone()));
                Ok(None)
            }
        }
    }
}
