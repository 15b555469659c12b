//! Telegram Bot API alerts

use async_trait::async_trait;
use serde::Serialize;

use super::{AlertKind, AlertSink};

const API_BASE_URL: &str = "https://api.telegram.org";

pub struct TelegramAlerter {
    client: reqwest::Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
    failures_enabled: bool,
    all_clear_enabled: bool,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramAlerter {
    pub fn new(
        bot_token: Option<String>,
        chat_id: Option<String>,
        failures_enabled: bool,
        all_clear_enabled: bool,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            bot_token,
            chat_id,
            failures_enabled,
            all_clear_enabled,
        }
    }

    fn enabled_for(&self, kind: AlertKind) -> bool {
        match kind {
            AlertKind::Failure => self.failures_enabled,
            AlertKind::AllClear => self.all_clear_enabled,
        }
    }

    async fn post_message(&self, bot_token: &str, chat_id: &str, text: &str) -> bool {
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", API_BASE_URL, bot_token))
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Telegram alert delivered");
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::error!("Telegram send failed: {} {}", status, body);
                false
            }
            Err(err) => {
                tracing::error!("Telegram send failed: {}", err.without_url());
                false
            }
        }
    }
}

#[async_trait]
impl AlertSink for TelegramAlerter {
    async fn send(&self, kind: AlertKind, message: &str) -> bool {
        if !self.enabled_for(kind) {
            return false;
        }

        let (Some(bot_token), Some(chat_id)) = (self.bot_token.as_deref(), self.chat_id.as_deref())
        else {
            tracing::warn!("Telegram alerts are enabled but BOT_TOKEN/CHAT_ID is not set");
            return false;
        };

        self.post_message(bot_token, chat_id, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_kind_is_not_sent() {
        let alerter = TelegramAlerter::new(
            Some("token".to_string()),
            Some("42".to_string()),
            false,
            false,
        );
        assert!(!alerter.send(AlertKind::Failure, "hello").await);
        assert!(!alerter.send(AlertKind::AllClear, "hello").await);
    }

    #[tokio::test]
    async fn missing_credentials_are_reported_as_failure() {
        let alerter = TelegramAlerter::new(None, Some("42".to_string()), true, true);
        assert!(!alerter.send(AlertKind::Failure, "hello").await);
    }

    #[test]
    fn kinds_are_gated_independently() {
        let alerter = TelegramAlerter::new(None, None, false, true);
        assert!(!alerter.enabled_for(AlertKind::Failure));
        assert!(alerter.enabled_for(AlertKind::AllClear));
    }
}
