pub mod channel;
pub mod command;
pub mod discord;
pub mod gateway;
pub mod router;

pub use channel::DiscordChannel;
pub use command::{BotCommand, USAGE};
pub use discord::{DiscordHttp, DiscordMessage, DiscordUser};
pub use gateway::{Gateway, Inbound};
pub use router::ReplyRouter;
