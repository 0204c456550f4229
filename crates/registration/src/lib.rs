pub mod activation;
pub mod captcha;
pub mod credentials;
pub mod domain_selector;
pub mod mailbox;
pub mod orchestrator;
pub mod registrar;
pub mod session;

pub use activation::extract_activation_code;
pub use captcha::{CaptchaRelay, ImageFormat};
pub use credentials::generate_credentials;
pub use domain_selector::{DomainSelector, ZoneChoice};
pub use mailbox::{MailboxProvider, SmailProClient};
pub use orchestrator::*;
pub use registrar::{FreeDnsClient, FreeDnsConnector, Registrar, RegistrarConnector};
pub use session::{FlowAbort, SessionRegistry, SessionSlot};
