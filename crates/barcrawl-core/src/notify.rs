use serde_json::json;

use crate::config::TelegramSection;

/// Run summaries go out through here. Delivery is best effort: a failed send
/// is logged and swallowed, never allowed to fail the run that produced it.
pub enum Notifier {
    Telegram(TelegramNotifier),
    Noop,
}

impl Notifier {
    #[must_use]
    pub fn from_config(telegram: Option<&TelegramSection>) -> Self {
        match telegram {
            Some(section) => Self::Telegram(TelegramNotifier::new(
                section.bot_token.clone(),
                section.chat_id.clone(),
            )),
            None => Self::Noop,
        }
    }

    pub async fn send(&self, text: &str) {
        match self {
            Self::Telegram(notifier) => {
                if let Err(error) = notifier.send(text).await {
                    tracing::warn!(%error, "notification delivery failed");
                }
            }
            Self::Noop => tracing::debug!(text, "notification (no channel configured)"),
        }
    }
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    #[must_use]
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    async fn send(&self, text: &str) -> Result<(), reqwest::Error> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token
        );
        self.client
            .post(url)
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
