use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("failed to create temporary mailbox: {0}")]
    MailboxCreate(String),

    #[error("failed {purpose} after {attempts} CAPTCHA attempts")]
    CaptchaExhausted { purpose: String, attempts: u32 },

    #[error("no activation email received within {0}s")]
    ActivationTimeout(u64),

    #[error("registrar rejected the request: {0}")]
    RegistrarRejected(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("a registration is already running for this user")]
    Busy,

    #[error("registration cancelled")]
    Aborted,

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BotError::Transport(format!("request timed out: {}", e))
        } else {
            BotError::Transport(e.to_string())
        }
    }
}

impl BotError {
    /// Whether the failure ends only the current attempt, leaving the
    /// surrounding retry loop free to try again.
    pub fn is_attempt_scoped(&self) -> bool {
        matches!(self, BotError::Transport(_) | BotError::RegistrarRejected(_))
    }
}
