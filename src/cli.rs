use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "freedns-bot", about = "Discord bot that registers FreeDNS accounts and subdomains")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to Discord and serve commands (default)
    Run,
    /// Print the activation code found in a saved email body
    ExtractCode {
        /// File holding the email text or HTML
        file: String,
    },
}
