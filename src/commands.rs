pub mod extract_code;

use std::sync::Arc;

use tracing::{info, warn};

use freedns_bot_channel::{BotCommand, Inbound, USAGE};
use freedns_bot_core::{FlowRequest, InteractiveChannel, UserId};
use freedns_bot_registration::{RegistrationOrchestrator, SessionRegistry};

/// Builds the channel a command's replies and CAPTCHA prompts go to
pub type ChannelFactory = Box<dyn Fn(&str) -> Arc<dyn InteractiveChannel> + Send + Sync>;

/// Executes operator commands. Registration flows run as their own tasks
/// so the dispatcher keeps serving other operators.
pub struct Dispatcher {
    orchestrator: Arc<RegistrationOrchestrator>,
    sessions: Arc<SessionRegistry>,
    channel_for: ChannelFactory,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Arc<RegistrationOrchestrator>,
        sessions: Arc<SessionRegistry>,
        channel_for: ChannelFactory,
    ) -> Self {
        Self {
            orchestrator,
            sessions,
            channel_for,
        }
    }

    pub async fn handle(&self, inbound: Inbound) {
        let channel = (self.channel_for)(&inbound.channel_id);
        let command = match inbound.command {
            Ok(command) => command,
            Err(e) => {
                reply(channel.as_ref(), &format!("❌ {}", e)).await;
                return;
            }
        };
        info!(user = %inbound.author_name, ?command, "command received");

        match command {
            BotCommand::Help => reply(channel.as_ref(), USAGE).await,
            BotCommand::AddDomain { alias, zone } => {
                self.orchestrator.add_domain(&alias, &zone);
                reply(
                    channel.as_ref(),
                    &format!("✅ Added domain `{}` with alias `{}`", zone, alias),
                )
                .await;
            }
            BotCommand::Domains => {
                reply(channel.as_ref(), &self.domain_listing()).await;
            }
            BotCommand::Cancel => {
                let text = if self.sessions.cancel(&inbound.author) {
                    "🛑 Cancelling your registration..."
                } else {
                    "Nothing to cancel."
                };
                reply(channel.as_ref(), text).await;
            }
            BotCommand::CreateDomain { ip, label, alias } => {
                self.start_flow(channel, inbound.author, &ip, &label, alias.as_deref())
                    .await;
            }
        }
    }

    async fn start_flow(
        &self,
        channel: Arc<dyn InteractiveChannel>,
        user: UserId,
        ip: &str,
        label: &str,
        alias: Option<&str>,
    ) {
        let request = match FlowRequest::parse(ip, label, alias) {
            Ok(request) => request,
            Err(e) => {
                reply(channel.as_ref(), &format!("❌ {}", e)).await;
                return;
            }
        };

        let mut session = match self.sessions.slot(&user).try_begin() {
            Ok(session) => session,
            Err(e) => {
                reply(channel.as_ref(), &format!("❌ {}", e)).await;
                return;
            }
        };

        reply(
            channel.as_ref(),
            &format!(
                "🚀 Creating subdomain `{}` pointing to `{}`...",
                request.label, request.destination
            ),
        )
        .await;

        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            match orchestrator.run(&mut session, channel.as_ref(), &user, &request).await {
                Ok(outcome) => info!(user = %user, "flow finished: {}", outcome),
                Err(e) => reply(channel.as_ref(), &format!("❌ {}", e)).await,
            }
        });
    }

    fn domain_listing(&self) -> String {
        let entries = self.orchestrator.domains().entries();
        if entries.is_empty() {
            return "No custom domains yet. Add one with `!adddomain <alias> <domain>`.".to_string();
        }

        let mut listing = String::from("**Custom domains**");
        for entry in entries {
            listing.push_str(&format!("\n`{}` → {}", entry.alias, entry.zone));
        }
        listing
    }
}

async fn reply(channel: &dyn InteractiveChannel, text: &str) {
    if let Err(e) = channel.send(text).await {
        warn!("failed to reply in {}: {}", channel.id(), e);
    }
}
