/// Temporary mailbox access (SmailPro) and activation polling
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use freedns_bot_core::config::MailboxConfig;
use freedns_bot_core::{BotError, MailboxSession, Message};

use crate::activation::extract_activation_code;
use crate::session::FlowAbort;

/// Mailbox provider contract. Stateless per call: reusing an existing
/// session is the caller's job.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    async fn create_mailbox(&self, zone: &str) -> Result<MailboxSession, BotError>;

    /// Inbox listing. Failures yield an empty list since no mail yet is a
    /// normal polling outcome.
    async fn list_messages(&self, session: &MailboxSession) -> Vec<Message>;

    /// Text and HTML bodies concatenated, or `None` if the fetch failed
    async fn fetch_message_body(&self, session: &MailboxSession, message_id: &str) -> Option<String>;
}

pub struct SmailProClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl SmailProClient {
    pub fn new(config: &MailboxConfig) -> Result<Self, BotError> {
        let base_url = Url::parse(&config.api_base)
            .map_err(|e| BotError::Config(format!("mailbox.api_base: {}", e)))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BotError> {
        self.base_url
            .join(path)
            .map_err(|e| BotError::Config(format!("bad mailbox endpoint {}: {}", path, e)))
    }

    async fn try_list_messages(&self, session: &MailboxSession) -> Result<Vec<Message>, BotError> {
        let url = self.endpoint(&format!("messages/{}", session.session_id))?;
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        let listing: MessagesResponse = response.json().await?;

        Ok(listing.messages.into_iter().map(Message::from).collect())
    }

    async fn try_fetch_body(&self, session: &MailboxSession, message_id: &str) -> Result<String, BotError> {
        let url = self.endpoint(&format!("message/{}/{}", session.session_id, message_id))?;
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        let content: MessageContent = response.json().await?;

        Ok(content.concatenated())
    }
}

#[async_trait]
impl MailboxProvider for SmailProClient {
    async fn create_mailbox(&self, zone: &str) -> Result<MailboxSession, BotError> {
        let url = self.endpoint("new-email")?;
        info!("creating temporary mailbox on {}", zone);

        let response = self
            .http_client
            .post(url)
            .json(&serde_json::json!({ "domain": zone }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BotError::MailboxCreate(e.to_string()))?;

        let created: NewEmailResponse = response
            .json()
            .await
            .map_err(|e| BotError::MailboxCreate(e.to_string()))?;

        created.into_session()
    }

    async fn list_messages(&self, session: &MailboxSession) -> Vec<Message> {
        match self.try_list_messages(session).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("error fetching messages for {}: {}", session.address, e);
                vec![]
            }
        }
    }

    async fn fetch_message_body(&self, session: &MailboxSession, message_id: &str) -> Option<String> {
        match self.try_fetch_body(session, message_id).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("error fetching message {}: {}", message_id, e);
                None
            }
        }
    }
}

/// Predicate matching messages whose sender contains any of `needles`
pub fn sender_filter(needles: &[String]) -> impl Fn(&Message) -> bool {
    let needles: Vec<String> = needles.iter().map(|n| n.to_lowercase()).collect();
    move |message: &Message| {
        let sender = message.sender.to_lowercase();
        needles.iter().any(|n| sender.contains(n.as_str()))
    }
}

/// Poll the inbox until a matching message yields an activation code.
///
/// Messages listed in `seen` are skipped. Every message whose body gets read
/// is added to it, the one the code came from included, so a reused mailbox
/// never hands out the same code twice.
///
/// Returns `Ok(None)` once `timeout` elapses, `Err(Aborted)` if the flow is
/// cancelled between polls.
pub async fn wait_for_activation<P>(
    provider: &dyn MailboxProvider,
    session: &MailboxSession,
    predicate: P,
    seen: &mut HashSet<String>,
    timeout: Duration,
    poll_interval: Duration,
    abort: &FlowAbort,
) -> Result<Option<String>, BotError>
where
    P: Fn(&Message) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut poll = 0u32;

    loop {
        abort.check()?;
        poll += 1;

        let messages = provider.list_messages(session).await;
        debug!("poll {}: {} messages in {}", poll, messages.len(), session.address);

        for message in messages.iter().filter(|m| predicate(*m)) {
            if seen.contains(&message.id) {
                continue;
            }
            info!("activation candidate from {}", message.sender);

            if let Some(body) = provider.fetch_message_body(session, &message.id).await {
                seen.insert(message.id.clone());
                if let Some(code) = extract_activation_code(&body) {
                    info!("found activation code after {} polls", poll);
                    return Ok(Some(code));
                }
            }
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            warn!("no activation email after {} polls", poll);
            return Ok(None);
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval.min(deadline - now)) => {}
            _ = abort.cancelled() => return Err(BotError::Aborted),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NewEmailResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    session_id: Option<Value>,
}

impl NewEmailResponse {
    fn into_session(self) -> Result<MailboxSession, BotError> {
        let address = self
            .email
            .filter(|e| e.contains('@'))
            .ok_or_else(|| BotError::MailboxCreate("response has no email address".into()))?;
        let session_id = self
            .session_id
            .as_ref()
            .and_then(value_to_id)
            .ok_or_else(|| BotError::MailboxCreate("response has no session id".into()))?;

        Ok(MailboxSession {
            address,
            session_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<SmailMessage>,
}

#[derive(Debug, Deserialize)]
struct SmailMessage {
    id: Value,
    #[serde(default)]
    from: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<String>,
}

impl From<SmailMessage> for Message {
    fn from(m: SmailMessage) -> Self {
        Message {
            id: value_to_id(&m.id).unwrap_or_default(),
            sender: m.from,
            subject: m.subject,
            text_body: m.text,
            html_body: m.html,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<String>,
}

impl MessageContent {
    fn concatenated(self) -> String {
        format!(
            "{}{}",
            self.text.unwrap_or_default(),
            self.html.unwrap_or_default()
        )
    }
}

// Provider ids come back as strings or numbers
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
