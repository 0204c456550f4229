/// FreeDNS (freedns.afraid.org) binding over its HTML forms
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use freedns_bot_core::config::RegistrarConfig;
use freedns_bot_core::{
    AccountRequest, BotError, CaptchaChallenge, Credentials, SubdomainRequest, Zone,
};

use super::{Registrar, RegistrarConnector};

static DOMAIN_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"edit_domain_id=(\d+)").unwrap());

/// Upper bound on registry pages read for one listing
const MAX_REGISTRY_PAGES: u32 = 20;

pub struct FreeDnsClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl FreeDnsClient {
    pub fn new(config: &RegistrarConfig) -> Result<Self, BotError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| BotError::Config(format!("registrar.base_url: {}", e)))?;
        let http_client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
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
            .map_err(|e| BotError::Config(format!("bad registrar endpoint {}: {}", path, e)))
    }

    async fn get_page(&self, url: Url) -> Result<String, BotError> {
        debug!("GET {}", url);
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn post_form(&self, url: Url, form: &[(&str, &str)]) -> Result<String, BotError> {
        debug!("POST {}", url);
        let response = self
            .http_client
            .post(url)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Registrar for FreeDnsClient {
    fn name(&self) -> &str {
        "freedns"
    }

    async fn get_captcha(&self) -> Result<CaptchaChallenge, BotError> {
        let url = self.endpoint("securimage/securimage_show.php")?;
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        let image = response.bytes().await?;

        Ok(CaptchaChallenge::new(image.to_vec()))
    }

    async fn create_account(&self, request: &AccountRequest) -> Result<(), BotError> {
        info!("submitting account {}", request.credentials.username);
        let url = self.endpoint("signup/?step=2")?;
        let page = self
            .post_form(
                url,
                &[
                    ("firstname", request.firstname.as_str()),
                    ("lastname", request.lastname.as_str()),
                    ("username", request.credentials.username.as_str()),
                    ("password", request.credentials.password.as_str()),
                    ("password2", request.credentials.password.as_str()),
                    ("email", request.email.as_str()),
                    ("captcha_code", request.captcha_code.as_str()),
                    ("tos", "1"),
                    ("action", "signup"),
                ],
            )
            .await?;

        reject_on_error(&page)
    }

    async fn activate_account(&self, code: String) -> Result<(), BotError> {
        let url = self.endpoint(&format!("signup/activate.php?{}", code))?;
        let page = self.get_page(url).await?;

        check_activation_page(&page)
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), BotError> {
        let url = self.endpoint("zc.php?step=2")?;
        let page = self
            .post_form(
                url,
                &[
                    ("username", credentials.username.as_str()),
                    ("password", credentials.password.as_str()),
                    ("remember", "1"),
                    ("submit", "Login"),
                    ("action", "auth"),
                ],
            )
            .await?;

        reject_on_error(&page)?;
        if !page.to_lowercase().contains("logout") {
            return Err(BotError::RegistrarRejected(format!(
                "login as {} did not open a session",
                credentials.username
            )));
        }
        Ok(())
    }

    async fn get_registry(&self) -> Result<Vec<Zone>, BotError> {
        let mut zones: Vec<Zone> = Vec::new();
        for page_number in 1..=MAX_REGISTRY_PAGES {
            let url = self.endpoint(&format!("domain/registry/?page={}&sort=2&q=", page_number))?;
            let page = self.get_page(url).await?;
            if merge_registry_page(&mut zones, &page) == 0 {
                break;
            }
        }
        debug!("registry lists {} domains", zones.len());
        Ok(zones)
    }

    async fn get_domain_id(&self, domain: &str) -> Result<u64, BotError> {
        let mut url = self.endpoint("domain/registry/")?;
        url.query_pairs_mut().append_pair("q", domain);
        let page = self.get_page(url).await?;

        parse_registry(&page)
            .into_iter()
            .find(|z| z.domain.eq_ignore_ascii_case(domain))
            .map(|z| z.id)
            .ok_or_else(|| {
                BotError::RegistrarRejected(format!("{} is not in the shared domain registry", domain))
            })
    }

    async fn create_subdomain(
        &self,
        captcha_code: &str,
        request: &SubdomainRequest,
    ) -> Result<(), BotError> {
        let url = self.endpoint("subdomain/save.php?step=2")?;
        let zone_id = request.zone_id.to_string();
        let address = request.destination.to_string();
        let page = self
            .post_form(
                url,
                &[
                    ("type", request.record_type.as_str()),
                    ("subdomain", request.label.as_str()),
                    ("domain_id", zone_id.as_str()),
                    ("address", address.as_str()),
                    ("ttlalias", "For our premium supporters"),
                    ("wildcard", ""),
                    ("captcha_code", captcha_code),
                    ("ref", ""),
                    ("send", "Save!"),
                ],
            )
            .await?;

        reject_on_error(&page)
    }
}

/// Builds a `FreeDnsClient` with its own cookie jar for each flow
pub struct FreeDnsConnector {
    config: RegistrarConfig,
}

impl FreeDnsConnector {
    pub fn new(config: RegistrarConfig) -> Self {
        Self { config }
    }
}

impl RegistrarConnector for FreeDnsConnector {
    fn connect(&self) -> Result<Box<dyn Registrar>, BotError> {
        Ok(Box::new(FreeDnsClient::new(&self.config)?))
    }
}

/// Zones linked from a registry listing page
pub fn parse_registry(html: &str) -> Vec<Zone> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse(r#"a[href*="edit_domain_id="]"#).unwrap();

    let mut zones: Vec<Zone> = Vec::new();
    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(id) = DOMAIN_ID_RE
            .captures(href)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };

        let domain = link.text().collect::<String>().trim().to_lowercase();
        if domain.is_empty() || zones.iter().any(|z| z.id == id) {
            continue;
        }
        zones.push(Zone { id, domain });
    }

    zones
}

/// Add the zones of one registry page that are not known yet.
/// Returns how many were added; zero means the listing is exhausted.
pub fn merge_registry_page(zones: &mut Vec<Zone>, html: &str) -> usize {
    let before = zones.len();
    for zone in parse_registry(html) {
        if !zones.iter().any(|z| z.id == zone.id) {
            zones.push(zone);
        }
    }
    zones.len() - before
}

/// Error text the registrar rendered into a page, if any
pub fn page_error(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let error_selector =
        Selector::parse(r##"font[color="red"], font[color="#FF0000"], .error, .errors li"##).unwrap();

    let messages: Vec<String> = document
        .select(&error_selector)
        .map(|e| e.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

fn reject_on_error(page: &str) -> Result<(), BotError> {
    match page_error(page) {
        Some(message) => Err(BotError::RegistrarRejected(message)),
        None => Ok(()),
    }
}

/// The activation page only counts as a rejection when it renders an error block
fn check_activation_page(page: &str) -> Result<(), BotError> {
    reject_on_error(page).map_err(|e| match e {
        BotError::RegistrarRejected(message) => {
            BotError::RegistrarRejected(format!("activation code was not accepted: {}", message))
        }
        other => other,
    })
}
