pub mod channel;
pub mod config;
pub mod domain_table;
pub mod error;
pub mod types;

pub use channel::{Attachment, InteractiveChannel, UserId};
pub use config::AppConfig;
pub use domain_table::CustomDomainTable;
pub use error::BotError;
pub use types::*;
