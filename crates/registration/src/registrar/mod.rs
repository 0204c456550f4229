pub mod freedns;

use async_trait::async_trait;

use freedns_bot_core::{
    AccountRequest, BotError, CaptchaChallenge, Credentials, SubdomainRequest, Zone,
};

pub use freedns::{FreeDnsClient, FreeDnsConnector};

/// Operations the orchestrator needs from a dynamic-DNS registrar.
/// A `Registrar` carries one login session; obtain a fresh one per flow.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Name of the registrar
    fn name(&self) -> &str;

    async fn get_captcha(&self) -> Result<CaptchaChallenge, BotError>;

    async fn create_account(&self, request: &AccountRequest) -> Result<(), BotError>;

    async fn activate_account(&self, code: String) -> Result<(), BotError>;

    async fn login(&self, credentials: &Credentials) -> Result<(), BotError>;

    async fn get_registry(&self) -> Result<Vec<Zone>, BotError>;

    async fn get_domain_id(&self, domain: &str) -> Result<u64, BotError>;

    async fn create_subdomain(
        &self,
        captcha_code: &str,
        request: &SubdomainRequest,
    ) -> Result<(), BotError>;
}

/// Factory for per-flow registrar sessions
pub trait RegistrarConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Registrar>, BotError>;
}
