use std::time::Duration;

use serde::Deserialize;

use crate::error::BotError;

/// Environment variable carrying the Discord bot token.
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub mailbox: MailboxConfig,
    pub registrar: RegistrarConfig,
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub flow: FlowConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    pub api_base: String,
    /// Channels the bot listens to for commands and CAPTCHA replies
    pub channel_ids: Vec<String>,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default = "default_gateway_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    pub api_base: String,
    pub domain: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_mail_poll_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_activation_timeout")]
    pub activation_timeout_seconds: u64,
    /// Substrings matched (case-insensitive) against the sender of activation mail
    pub activation_senders: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistrarConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    pub user_agent: String,
    pub firstname: String,
    pub lastname: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptchaConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlowConfig {
    #[serde(default = "default_record_type")]
    pub record_type: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            record_type: default_record_type(),
        }
    }
}

fn default_command_prefix() -> String { "!".to_string() }
fn default_gateway_poll_ms() -> u64 { 1500 }
fn default_request_timeout() -> u64 { 10 }
fn default_mail_poll_seconds() -> u64 { 5 }
fn default_activation_timeout() -> u64 { 120 }
fn default_max_retries() -> u32 { 3 }
fn default_reply_timeout() -> u64 { 120 }
fn default_record_type() -> String { "A".to_string() }

impl AppConfig {
    pub fn from_toml(raw: &str) -> Result<Self, BotError> {
        let config: AppConfig =
            toml::from_str(raw).map_err(|e| BotError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        if self.captcha.max_retries == 0 {
            return Err(BotError::Config("captcha.max_retries must be at least 1".into()));
        }
        if self.mailbox.poll_interval_seconds == 0 {
            return Err(BotError::Config("mailbox.poll_interval_seconds must be positive".into()));
        }
        url::Url::parse(&self.mailbox.api_base)
            .map_err(|e| BotError::Config(format!("mailbox.api_base: {}", e)))?;
        url::Url::parse(&self.registrar.base_url)
            .map_err(|e| BotError::Config(format!("registrar.base_url: {}", e)))?;
        url::Url::parse(&self.discord.api_base)
            .map_err(|e| BotError::Config(format!("discord.api_base: {}", e)))?;
        Ok(())
    }

    pub fn activation_timeout(&self) -> Duration {
        Duration::from_secs(self.mailbox.activation_timeout_seconds)
    }

    pub fn mail_poll_interval(&self) -> Duration {
        Duration::from_secs(self.mailbox.poll_interval_seconds)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.captcha.reply_timeout_seconds)
    }
}
