use std::time::Duration;

use async_trait::async_trait;

use crate::error::BotError;

/// Identifier of a chat user (Discord snowflake as text)
pub type UserId = String;

/// File attached to an outgoing message
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// One conversation with an operator.
///
/// Implementations allow at most one outstanding `await_next_message` per
/// user at a time; a second concurrent wait fails with `BotError::Channel`.
#[async_trait]
pub trait InteractiveChannel: Send + Sync {
    fn id(&self) -> &str;

    async fn send(&self, text: &str) -> Result<(), BotError>;

    async fn send_image(&self, text: &str, image: Attachment) -> Result<(), BotError>;

    /// Next message from `user` in this channel, or `None` once `timeout` elapses.
    async fn await_next_message(
        &self,
        user: &UserId,
        timeout: Duration,
    ) -> Result<Option<String>, BotError>;
}
