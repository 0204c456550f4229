use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use freedns_bot_core::{Attachment, BotError, InteractiveChannel, UserId};

use crate::discord::DiscordHttp;
use crate::router::ReplyRouter;

/// One Discord text channel as seen by a registration flow
#[derive(Clone)]
pub struct DiscordChannel {
    channel_id: String,
    http: Arc<DiscordHttp>,
    router: Arc<ReplyRouter>,
}

impl DiscordChannel {
    pub fn new(channel_id: String, http: Arc<DiscordHttp>, router: Arc<ReplyRouter>) -> Self {
        Self {
            channel_id,
            http,
            router,
        }
    }
}

#[async_trait]
impl InteractiveChannel for DiscordChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    async fn send(&self, text: &str) -> Result<(), BotError> {
        self.http.send_message(&self.channel_id, text).await?;
        Ok(())
    }

    async fn send_image(&self, text: &str, image: Attachment) -> Result<(), BotError> {
        self.http.send_file(&self.channel_id, text, image).await?;
        Ok(())
    }

    async fn await_next_message(
        &self,
        user: &UserId,
        timeout: Duration,
    ) -> Result<Option<String>, BotError> {
        self.router.wait(&self.channel_id, user, timeout).await
    }
}
