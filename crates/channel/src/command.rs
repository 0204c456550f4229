use freedns_bot_core::BotError;

pub const USAGE: &str = "**Commands**\n\
    `!adddomain <alias> <domain>` add a domain to use with a custom alias\n\
    `!createdomain <ip> <subdomain> [alias]` create a FreeDNS account and subdomain\n\
    `!domains` list custom domains\n\
    `!cancel` stop your running registration\n\
    `!help` show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    AddDomain {
        alias: String,
        zone: String,
    },
    CreateDomain {
        ip: String,
        label: String,
        alias: Option<String>,
    },
    Domains,
    Cancel,
    Help,
}

impl BotCommand {
    /// `Ok(None)` for ordinary chatter without the prefix. Malformed or
    /// unknown commands come back as `InvalidRequest` carrying the usage line.
    pub fn parse(prefix: &str, text: &str) -> Result<Option<Self>, BotError> {
        let Some(body) = text.trim().strip_prefix(prefix) else {
            return Ok(None);
        };
        let mut words = body.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (name.to_lowercase().as_str(), args.as_slice()) {
            ("adddomain", [alias, zone]) => BotCommand::AddDomain {
                alias: alias.to_string(),
                zone: zone.to_string(),
            },
            ("adddomain", _) => return Err(usage_error(prefix, "adddomain <alias> <domain>")),
            ("createdomain", [ip, label]) => BotCommand::CreateDomain {
                ip: ip.to_string(),
                label: label.to_string(),
                alias: None,
            },
            ("createdomain", [ip, label, alias]) => BotCommand::CreateDomain {
                ip: ip.to_string(),
                label: label.to_string(),
                alias: Some(alias.to_string()),
            },
            ("createdomain", _) => {
                return Err(usage_error(prefix, "createdomain <ip> <subdomain> [alias]"))
            }
            ("domains", []) => BotCommand::Domains,
            ("cancel", []) => BotCommand::Cancel,
            ("help", _) => BotCommand::Help,
            (other, _) => {
                return Err(BotError::InvalidRequest(format!(
                    "unknown command `{}{}`, try `{}help`",
                    prefix, other, prefix
                )))
            }
        };

        Ok(Some(command))
    }
}

fn usage_error(prefix: &str, usage: &str) -> BotError {
    BotError::InvalidRequest(format!("usage: `{}{}`", prefix, usage))
}
