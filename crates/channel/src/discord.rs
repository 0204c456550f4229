/// Minimal Discord REST v10 client
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use freedns_bot_core::config::DiscordConfig;
use freedns_bot_core::{Attachment, BotError};

/// Discord rejects message bodies longer than this
pub const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
}

impl DiscordMessage {
    /// Snowflake as a number; unparseable ids sort first
    pub fn snowflake(&self) -> u64 {
        self.id.parse().unwrap_or(0)
    }
}

pub struct DiscordHttp {
    http_client: reqwest::Client,
    api_base: Url,
}

impl DiscordHttp {
    pub fn new(config: &DiscordConfig, token: &str) -> Result<Self, BotError> {
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| BotError::Config(format!("discord.api_base: {}", e)))?;

        let mut auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|_| BotError::Config("DISCORD_TOKEN contains invalid characters".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("DiscordBot (https://github.com/freedns-bot, 0.1)")
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            api_base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BotError> {
        self.api_base
            .join(path)
            .map_err(|e| BotError::Config(format!("bad discord endpoint {}: {}", path, e)))
    }

    /// The bot's own account
    pub async fn current_user(&self) -> Result<DiscordUser, BotError> {
        let url = self.endpoint("users/@me")?;
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<DiscordMessage, BotError> {
        let url = self.endpoint(&format!("channels/{}/messages", channel_id))?;
        debug!("POST message to channel {}", channel_id);

        let response = self
            .http_client
            .post(url)
            .json(&json!({ "content": truncate_content(content) }))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Post a message with one file attached
    pub async fn send_file(
        &self,
        channel_id: &str,
        content: &str,
        attachment: Attachment,
    ) -> Result<DiscordMessage, BotError> {
        let url = self.endpoint(&format!("channels/{}/messages", channel_id))?;
        debug!("POST {} to channel {}", attachment.filename, channel_id);

        let payload = json!({
            "content": truncate_content(content),
            "attachments": [{ "id": 0, "filename": attachment.filename }],
        });
        let file = Part::bytes(attachment.data)
            .file_name(attachment.filename)
            .mime_str(&attachment.content_type)?;
        let form = Form::new()
            .text("payload_json", payload.to_string())
            .part("files[0]", file);

        let response = self
            .http_client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Messages newer than `after`, oldest first
    pub async fn fetch_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
        limit: u8,
    ) -> Result<Vec<DiscordMessage>, BotError> {
        let mut url = self.endpoint(&format!("channels/{}/messages", channel_id))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.clamp(1, 100).to_string());
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }

        let response = self.http_client.get(url).send().await?.error_for_status()?;
        let mut messages: Vec<DiscordMessage> = response.json().await?;
        messages.sort_by_key(DiscordMessage::snowflake);
        Ok(messages)
    }
}

/// Cut `content` to what Discord accepts, on a char boundary
pub fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(MAX_CONTENT_CHARS - 1).collect();
    cut.push('…');
    cut
}
