use std::time::Duration;

use tracing::{info, warn};

use freedns_bot_core::{Attachment, BotError, CaptchaChallenge, InteractiveChannel, UserId};

use crate::session::FlowAbort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Detect the format from the payload's magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::WebP)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::WebP => "image/webp",
        }
    }
}

/// Turn a challenge into a chat attachment, or `None` if it isn't an image
pub fn challenge_attachment(challenge: CaptchaChallenge) -> Option<Attachment> {
    let format = ImageFormat::sniff(&challenge.image)?;
    Some(Attachment {
        filename: format!("captcha.{}", format.extension()),
        content_type: format.content_type().to_string(),
        data: challenge.image,
    })
}

/// Keep only ASCII letters and digits of a human reply
pub fn sanitize_response(reply: &str) -> String {
    reply.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Shows CAPTCHA challenges to a human and collects their answer.
/// Never retries: the orchestrator draws a fresh challenge per attempt.
#[derive(Debug, Clone)]
pub struct CaptchaRelay {
    reply_timeout: Duration,
}

impl CaptchaRelay {
    pub fn new(reply_timeout: Duration) -> Self {
        Self { reply_timeout }
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Relay one challenge. `Ok(None)` on timeout or when the image could not
    /// be shown; an empty string when the reply had nothing alphanumeric.
    #[allow(clippy::too_many_arguments)]
    pub async fn relay_challenge(
        &self,
        channel: &dyn InteractiveChannel,
        user: &UserId,
        challenge: CaptchaChallenge,
        purpose: &str,
        attempt_index: u32,
        max_attempts: u32,
        abort: &FlowAbort,
    ) -> Result<Option<String>, BotError> {
        abort.check()?;

        let Some(attachment) = challenge_attachment(challenge) else {
            warn!("CAPTCHA payload is not a known image format");
            notify(channel, "❌ Error showing CAPTCHA: unsupported image format").await;
            return Ok(None);
        };

        let prompt = format!(
            "🔐 Solve CAPTCHA for {} (Attempt {}/{}):",
            purpose,
            attempt_index + 1,
            max_attempts
        );
        if let Err(e) = channel.send_image(&prompt, attachment).await {
            warn!("failed to post CAPTCHA: {}", e);
            notify(channel, &format!("❌ Error showing CAPTCHA: {}", e)).await;
            return Ok(None);
        }

        info!(user = %user, purpose, attempt = attempt_index + 1, "waiting for CAPTCHA reply");

        let reply = tokio::select! {
            reply = channel.await_next_message(user, self.reply_timeout) => reply,
            _ = abort.cancelled() => return Err(BotError::Aborted),
        };

        match reply {
            Ok(Some(text)) => Ok(Some(sanitize_response(text.trim()))),
            Ok(None) => {
                notify(channel, "⌛ CAPTCHA timed out.").await;
                Ok(None)
            }
            Err(e) => {
                warn!("failed waiting for CAPTCHA reply: {}", e);
                notify(channel, &format!("❌ Error showing CAPTCHA: {}", e)).await;
                Ok(None)
            }
        }
    }
}

async fn notify(channel: &dyn InteractiveChannel, text: &str) {
    if let Err(e) = channel.send(text).await {
        warn!("failed to notify channel {}: {}", channel.id(), e);
    }
}
