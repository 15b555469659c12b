//! Live page driver
//!
//! Fetches the listing page over HTTP and classifies the cards present in
//! the server-rendered markup. Subresources are never requested.

use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;

use super::{parse_cards, CardLabels, CardSelectors, CheckError, CheckResult, PageDriver};

pub struct HttpDriver {
    client: reqwest::Client,
    selectors: CardSelectors,
    labels: CardLabels,
}

impl HttpDriver {
    pub fn new(
        user_agent: &str,
        selectors: CardSelectors,
        labels: CardLabels,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            selectors,
            labels,
        })
    }

    async fn fetch_page(&self, url: &str, timeout: Duration) -> Result<String, CheckError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| transport_error(url, timeout, err))?;

        if !response.status().is_success() {
            return Err(CheckError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|err| transport_error(url, timeout, err))
    }
}

fn transport_error(url: &str, timeout: Duration, err: reqwest::Error) -> CheckError {
    if err.is_timeout() {
        CheckError::Timeout {
            url: url.to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        CheckError::Other(anyhow::Error::new(err).context(format!("Failed to load {url}")))
    }
}

#[async_trait]
impl PageDriver for HttpDriver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn check(&self, url: &str, timeout: Duration) -> Result<CheckResult, CheckError> {
        tracing::info!("Opening URL: {}", url);
        let body = self.fetch_page(url, timeout).await?;
        let cards = parse_cards(&body, &self.selectors)?;
        Ok(CheckResult::from_cards(url, &cards, &self.labels))
    }
}
