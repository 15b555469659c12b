//! Page checking: card classification and the drivers feeding it

mod browser;
mod classifier;
mod html;
mod http;
mod snapshot;
mod traits;

pub use browser::{BrowserDriver, BrowserOptions, LoadStrategy};
pub use classifier::{classify_cards, extract_provider_name, CardLabels, CardTally, NAME_MAX_CHARS};
pub use html::{parse_cards, CardSelectors, HtmlCard, DEFAULT_CARD_SELECTOR, DEFAULT_HEADING_SELECTOR};
pub use http::HttpDriver;
pub use snapshot::{snapshot_path, SnapshotDriver};
pub use traits::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of checking one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub url: String,
    pub total_cards: usize,
    pub checked_cards: usize,
    pub missing_providers: Vec<String>,
}

impl CheckResult {
    pub fn from_cards<C: ContentCard>(url: &str, cards: &[C], labels: &CardLabels) -> Self {
        tracing::info!("Provider cards found: {}", cards.len());
        let tally = classify_cards(cards, labels);
        Self {
            url: url.to_string(),
            total_cards: tally.total,
            checked_cards: tally.checked,
            missing_providers: tally.missing,
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.missing_providers.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CheckError {
    #[error("Page load timed out after {seconds}s: {url}")]
    Timeout { url: String, seconds: u64 },
    #[error("Page returned HTTP {status}: {url}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which driver implementation a run uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverKind {
    Browser(BrowserOptions),
    Http,
    Snapshot(PathBuf),
}

impl DriverKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Browser(_) => "browser",
            Self::Http => "http",
            Self::Snapshot(_) => "snapshot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub kind: DriverKind,
    pub user_agent: String,
    pub selectors: CardSelectors,
    pub labels: CardLabels,
}

/// Factory handing every worker a fresh driver of the configured kind
pub struct DriverBuilder {
    options: DriverOptions,
}

impl DriverBuilder {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl DriverFactory for DriverBuilder {
    async fn build(&self) -> Result<Box<dyn PageDriver>, anyhow::Error> {
        let options = &self.options;
        let driver: Box<dyn PageDriver> = match &options.kind {
            DriverKind::Browser(browser) => Box::new(
                BrowserDriver::launch(browser, options.selectors.clone(), options.labels.clone())
                    .await?,
            ),
            DriverKind::Http => Box::new(HttpDriver::new(
                &options.user_agent,
                options.selectors.clone(),
                options.labels.clone(),
            )?),
            DriverKind::Snapshot(dir) => Box::new(SnapshotDriver::new(
                dir.clone(),
                options.selectors.clone(),
                options.labels.clone(),
            )),
        };
        tracing::debug!("Built {} driver", driver.name());
        Ok(driver)
    }
}
