//! Headless Chrome driver
//!
//! Renders the listing in a real browser so cards built client-side are
//! present before classification. One browser process per driver; the
//! rendered DOM is handed to the same card parser the static drivers use.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{parse_cards, CardLabels, CardSelectors, CheckError, CheckResult, PageDriver};

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
// the blank start tab must not count as the target document
const READY_STATE_SCRIPT: &str =
    "document.location.href === 'about:blank' ? 'loading' : document.readyState";

const IMAGE_PATTERNS: [&str; 7] = ["*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico"];
const CSS_PATTERNS: [&str; 1] = ["*.css"];
const FONT_PATTERNS: [&str; 4] = ["*.woff", "*.woff2", "*.ttf", "*.otf"];

/// How far the document must get before the DOM is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStrategy {
    /// `readyState == "complete"`
    Normal,
    /// DOM parsed (`interactive` or later)
    #[default]
    Eager,
    /// Read whatever is there right after navigation starts
    None,
}

impl LoadStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "eager" => Some(Self::Eager),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    fn is_ready(self, ready_state: &str) -> bool {
        match self {
            Self::Normal => ready_state == "complete",
            Self::Eager => matches!(ready_state, "interactive" | "complete"),
            Self::None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserOptions {
    pub headless: bool,
    pub load_strategy: LoadStrategy,
    pub block_images: bool,
    pub block_css: bool,
    pub block_fonts: bool,
    pub chrome_path: Option<PathBuf>,
    /// Limit for individual DevTools requests
    pub request_timeout: Duration,
    /// Only sent when configured; otherwise Chrome's own UA is kept
    pub user_agent: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            load_strategy: LoadStrategy::default(),
            block_images: true,
            block_css: true,
            block_fonts: true,
            chrome_path: None,
            request_timeout: Duration::from_secs(15),
            user_agent: None,
        }
    }
}

impl BrowserOptions {
    /// URL patterns handed to `Network.setBlockedURLs`
    pub fn blocked_url_patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        if self.block_images {
            patterns.extend(IMAGE_PATTERNS.iter().map(|p| p.to_string()));
        }
        if self.block_css {
            patterns.extend(CSS_PATTERNS.iter().map(|p| p.to_string()));
        }
        if self.block_fonts {
            patterns.extend(FONT_PATTERNS.iter().map(|p| p.to_string()));
        }
        patterns
    }

    fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
        ];
        if self.block_images {
            args.push("--blink-settings=imagesEnabled=false".to_string());
        }
        if let Some(user_agent) = &self.user_agent {
            args.push(format!("--user-agent={user_agent}"));
        }
        args
    }

    fn launch_config(&self) -> Result<BrowserConfig, anyhow::Error> {
        let mut builder = BrowserConfig::builder()
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .request_timeout(self.request_timeout)
            .args(self.launch_args());
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|err| anyhow!("Invalid browser configuration: {}", err))
    }
}

struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

pub struct BrowserDriver {
    session: Mutex<Option<BrowserSession>>,
    load_strategy: LoadStrategy,
    selectors: CardSelectors,
    labels: CardLabels,
}

impl BrowserDriver {
    /// Start a browser with one blank tab, ready for `check`
    pub async fn launch(
        options: &BrowserOptions,
        selectors: CardSelectors,
        labels: CardLabels,
    ) -> Result<Self, anyhow::Error> {
        let config = options.launch_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome")?;

        let handler = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        let page = match open_page(&browser, &options.blocked_url_patterns()).await {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                handler.abort();
                return Err(err);
            }
        };

        Ok(Self {
            session: Mutex::new(Some(BrowserSession {
                browser,
                page,
                handler,
            })),
            load_strategy: options.load_strategy,
            selectors,
            labels,
        })
    }

    async fn render(&self, url: &str) -> Result<String, anyhow::Error> {
        let page = {
            let session = self.session.lock().await;
            session
                .as_ref()
                .map(|session| session.page.clone())
                .ok_or_else(|| anyhow!("Browser driver is already closed"))?
        };

        page.execute(NavigateParams::new(url))
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;

        while self.load_strategy != LoadStrategy::None {
            let ready_state: String = page
                .evaluate(READY_STATE_SCRIPT)
                .await
                .context("Failed to read document state")?
                .into_value()
                .context("Unexpected document state value")?;
            if self.load_strategy.is_ready(&ready_state) {
                break;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        page.content().await.context("Failed to read rendered page")
    }
}

async fn open_page(browser: &Browser, blocked: &[String]) -> Result<Page, anyhow::Error> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("Failed to open browser tab")?;
    if !blocked.is_empty() {
        page.execute(EnableParams::default())
            .await
            .context("Failed to enable network domain")?;
        page.execute(SetBlockedUrLsParams::new(blocked.to_vec()))
            .await
            .context("Failed to block resources")?;
    }
    Ok(page)
}

#[async_trait]
impl PageDriver for BrowserDriver {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn check(&self, url: &str, timeout: Duration) -> Result<CheckResult, CheckError> {
        tracing::info!("Opening URL: {}", url);
        let body = match tokio::time::timeout(timeout, self.render(url)).await {
            Ok(body) => body?,
            Err(_) => {
                return Err(CheckError::Timeout {
                    url: url.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        };

        let cards = parse_cards(&body, &self.selectors)?;
        Ok(CheckResult::from_cards(url, &cards, &self.labels))
    }

    async fn close(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };

        if let Err(err) = session.browser.close().await {
            tracing::warn!("Failed to close Chrome: {}", err);
        }
        if let Err(err) = session.browser.wait().await {
            tracing::warn!("Chrome did not exit cleanly: {}", err);
        }
        session.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_load_strategies() {
        assert_eq!(LoadStrategy::parse("Eager"), Some(LoadStrategy::Eager));
        assert_eq!(LoadStrategy::parse(" normal "), Some(LoadStrategy::Normal));
        assert_eq!(LoadStrategy::parse("none"), Some(LoadStrategy::None));
        assert_eq!(LoadStrategy::parse("lazy"), None);
    }

    #[test]
    fn ready_state_depends_on_strategy() {
        assert!(!LoadStrategy::Eager.is_ready("loading"));
        assert!(LoadStrategy::Eager.is_ready("interactive"));
        assert!(!LoadStrategy::Normal.is_ready("interactive"));
        assert!(LoadStrategy::Normal.is_ready("complete"));
        assert!(LoadStrategy::None.is_ready("loading"));
    }

    #[test]
    fn blocked_patterns_follow_flags() {
        let everything = BrowserOptions::default().blocked_url_patterns();
        assert!(everything.contains(&"*.png".to_string()));
        assert!(everything.contains(&"*.css".to_string()));
        assert!(everything.contains(&"*.woff2".to_string()));

        let fonts_only = BrowserOptions {
            block_images: false,
            block_css: false,
            ..BrowserOptions::default()
        };
        assert_eq!(
            fonts_only.blocked_url_patterns(),
            vec!["*.woff", "*.woff2", "*.ttf", "*.otf"]
        );

        let nothing = BrowserOptions {
            block_images: false,
            block_css: false,
            block_fonts: false,
            ..BrowserOptions::default()
        };
        assert!(nothing.blocked_url_patterns().is_empty());
    }

    #[test]
    fn launch_args_carry_image_switch_and_user_agent() {
        let options = BrowserOptions {
            user_agent: Some("Mozilla/5.0 test".to_string()),
            ..BrowserOptions::default()
        };
        let args = options.launch_args();
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--blink-settings=imagesEnabled=false".to_string()));
        assert!(args.contains(&"--user-agent=Mozilla/5.0 test".to_string()));

        let plain = BrowserOptions {
            block_images: false,
            ..BrowserOptions::default()
        };
        assert_eq!(plain.launch_args().len(), 3);
    }

    #[tokio::test]
    #[ignore = "needs a local Chrome"]
    async fn renders_inline_page() {
        let driver = BrowserDriver::launch(
            &BrowserOptions::default(),
            CardSelectors::default(),
            CardLabels::default(),
        )
        .await
        .expect("launch");

        let page = "data:text/html,<div data-sentry-component='ProviderCardFull'><b>FastNet</b><span>Speed</span><span>Connection</span></div>";
        let result = driver
            .check(page, Duration::from_secs(20))
            .await
            .expect("check");
        driver.close().await;

        assert_eq!(result.checked_cards, 1);
        assert_eq!(result.missing_providers, vec!["FastNet".to_string()]);
    }
}
