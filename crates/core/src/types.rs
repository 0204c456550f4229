use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::BotError;

/// A temporary inbox registered with the mailbox provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxSession {
    pub address: String,
    pub session_id: String,
}

/// Read-only snapshot of a message held by the mailbox provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub subject: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
}

/// Account credentials, generated fresh for every submission attempt
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Single-use CAPTCHA image as served by the registrar
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub image: Vec<u8>,
}

impl CaptchaChallenge {
    pub fn new(image: Vec<u8>) -> Self {
        Self { image }
    }
}

/// Everything the registrar needs to open an account
#[derive(Debug, Clone)]
pub struct AccountRequest {
    pub captcha_code: String,
    pub firstname: String,
    pub lastname: String,
    pub credentials: Credentials,
    pub email: String,
}

/// A DNS zone offered by the registrar's shared-domain registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u64,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdomainRequest {
    pub label: String,
    pub zone_id: u64,
    pub record_type: String,
    pub destination: Ipv4Addr,
}

/// Operator input for one end-to-end run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    pub destination: Ipv4Addr,
    pub label: String,
    pub alias: Option<String>,
}

impl FlowRequest {
    /// Validate raw command arguments before anything touches the network.
    pub fn parse(ip: &str, label: &str, alias: Option<&str>) -> Result<Self, BotError> {
        let destination: Ipv4Addr = ip
            .trim()
            .parse()
            .map_err(|_| BotError::InvalidRequest(format!("`{}` is not an IPv4 address", ip)))?;

        let label = label.trim().to_lowercase();
        if !is_valid_label(&label) {
            return Err(BotError::InvalidRequest(format!(
                "`{}` is not a valid subdomain label",
                label
            )));
        }

        Ok(Self {
            destination,
            label,
            alias: alias.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
        })
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub fqdn: String,
    pub destination: Ipv4Addr,
    pub credentials: Credentials,
    pub email: String,
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.fqdn, self.destination)
    }
}
