//! Environment-based configuration
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file in the working directory.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::checker::{
    BrowserOptions, CardLabels, CardSelectors, DriverKind, DriverOptions, LoadStrategy,
    DEFAULT_CARD_SELECTOR, DEFAULT_HEADING_SELECTOR,
};
use crate::storage::default_status_path;

const DEFAULT_URLS_DIR: &str = "data/urls";
const DEFAULT_SNAPSHOT_DIR: &str = "data/snapshots";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_WAIT_TIMEOUT_SECONDS: u64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub urls_path: PathBuf,
    pub driver: DriverOptions,
    pub wait_timeout: Duration,
    pub workers: usize,
    pub alerts_enabled: bool,
    pub success_alerts_enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub sheet_id: Option<String>,
    pub google_credentials: Option<PathBuf>,
    pub worksheet_title: Option<String>,
    pub stats_file: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            // logging is not up yet
            eprintln!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|value| value.trim().to_string());
        let non_empty = |key: &str| get(key).filter(|value| !value.is_empty());

        let wait_seconds = get("WAIT_TIMEOUT_SECONDS")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECONDS)
            .max(1);

        let driver_kind = match non_empty("DRIVER").as_deref().unwrap_or("browser") {
            "browser" => DriverKind::Browser(BrowserOptions {
                headless: parse_bool(get("HEADLESS").as_deref(), true),
                load_strategy: match non_empty("PAGE_LOAD_STRATEGY") {
                    Some(value) => LoadStrategy::parse(&value).with_context(|| {
                        format!("Unknown PAGE_LOAD_STRATEGY '{}' (expected normal, eager or none)", value)
                    })?,
                    None => LoadStrategy::default(),
                },
                block_images: parse_bool(get("BLOCK_IMAGES").as_deref(), true),
                block_css: parse_bool(get("BLOCK_CSS").as_deref(), true),
                block_fonts: parse_bool(get("BLOCK_FONTS").as_deref(), true),
                chrome_path: non_empty("CHROME_PATH").map(PathBuf::from),
                request_timeout: Duration::from_secs(wait_seconds),
                user_agent: non_empty("USER_AGENT"),
            }),
            "http" => DriverKind::Http,
            "snapshot" => DriverKind::Snapshot(PathBuf::from(
                non_empty("SNAPSHOT_DIR").unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.to_string()),
            )),
            other => bail!("Unknown DRIVER '{}' (expected browser, http or snapshot)", other),
        };

        let selectors = CardSelectors::new(
            &non_empty("CARD_SELECTOR").unwrap_or_else(|| DEFAULT_CARD_SELECTOR.to_string()),
            &non_empty("HEADING_SELECTOR").unwrap_or_else(|| DEFAULT_HEADING_SELECTOR.to_string()),
        )
        .context("Invalid card selectors")?;

        let default_labels = CardLabels::default();
        let labels = CardLabels {
            speed: non_empty("LABEL_SPEED").unwrap_or(default_labels.speed),
            connection: non_empty("LABEL_CONNECTION").unwrap_or(default_labels.connection),
            fee: non_empty("LABEL_FEE").unwrap_or(default_labels.fee),
        };

        let user_agent = non_empty("USER_AGENT")
            .unwrap_or_else(|| format!("FeeWatch/{}", env!("CARGO_PKG_VERSION")));

        let workers = match non_empty("WORKERS") {
            Some(value) => parse_workers(&value)?,
            None => 1,
        };

        let stats_file = match non_empty("STATS_FILE") {
            Some(path) => PathBuf::from(path),
            None => default_status_path()
                .unwrap_or_else(|_| PathBuf::from("data").join("url-status.json")),
        };

        // an explicitly empty LOG_DIR turns the file log off
        let log_dir = match get("LOG_DIR") {
            Some(dir) if dir.is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from(DEFAULT_LOG_DIR)),
        };

        Ok(Self {
            urls_path: PathBuf::from(
                non_empty("URLS_DIR").unwrap_or_else(|| DEFAULT_URLS_DIR.to_string()),
            ),
            driver: DriverOptions {
                kind: driver_kind,
                user_agent,
                selectors,
                labels,
            },
            wait_timeout: Duration::from_secs(wait_seconds),
            workers,
            alerts_enabled: parse_bool(get("ALERTS_ENABLED").as_deref(), true),
            success_alerts_enabled: parse_bool(get("SUCCESS_ALERTS_ENABLED").as_deref(), false),
            bot_token: non_empty("BOT_TOKEN"),
            chat_id: non_empty("CHAT_ID"),
            sheet_id: non_empty("SHEET_ID"),
            google_credentials: non_empty("GOOGLE_SERVICE_ACCOUNT_JSON")
                .or_else(|| non_empty("GOOGLE_CREDENTIALS_JSON"))
                .map(PathBuf::from),
            worksheet_title: non_empty("SHEET_WORKSHEET_TITLE"),
            stats_file,
            log_dir,
        })
    }
}

pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value {
        None => default,
        Some(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
    }
}

pub fn parse_workers(value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(workers) if workers > 0 => Ok(workers),
        _ => bail!("Worker count must be a positive integer, got '{}'", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).expect("config");

        assert_eq!(config.urls_path, PathBuf::from("data/urls"));
        assert_eq!(
            config.driver.kind,
            DriverKind::Browser(BrowserOptions::default())
        );
        assert_eq!(config.driver.labels, CardLabels::default());
        assert_eq!(config.wait_timeout, Duration::from_secs(15));
        assert_eq!(config.workers, 1);
        assert!(config.alerts_enabled);
        assert!(!config.success_alerts_enabled);
        assert!(config.bot_token.is_none());
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
        assert!(config.stats_file.ends_with("url-status.json"));
    }

    #[test]
    fn reads_explicit_values() {
        let config = config_from(&[
            ("URLS_DIR", "lists/urls.xlsx"),
            ("DRIVER", "snapshot"),
            ("SNAPSHOT_DIR", "pages"),
            ("WAIT_TIMEOUT_SECONDS", "30"),
            ("WORKERS", "4"),
            ("ALERTS_ENABLED", "no"),
            ("SUCCESS_ALERTS_ENABLED", "Yes"),
            ("BOT_TOKEN", " 123:abc "),
            ("CHAT_ID", "-100"),
            ("SHEET_ID", "sheet"),
            ("GOOGLE_SERVICE_ACCOUNT_JSON", "service-account.json"),
            ("GOOGLE_CREDENTIALS_JSON", "creds.json"),
            ("SHEET_WORKSHEET_TITLE", "Report"),
            ("STATS_FILE", "state/status.json"),
            ("LOG_DIR", ""),
            ("LABEL_FEE", "Абонентская плата"),
        ])
        .expect("config");

        assert_eq!(config.urls_path, PathBuf::from("lists/urls.xlsx"));
        assert_eq!(config.driver.kind, DriverKind::Snapshot(PathBuf::from("pages")));
        assert_eq!(config.wait_timeout, Duration::from_secs(30));
        assert_eq!(config.workers, 4);
        assert!(!config.alerts_enabled);
        assert!(config.success_alerts_enabled);
        assert_eq!(config.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(
            config.google_credentials,
            Some(PathBuf::from("service-account.json"))
        );
        assert_eq!(config.stats_file, PathBuf::from("state/status.json"));
        assert_eq!(config.log_dir, None);
        assert_eq!(config.driver.labels.fee, "Абонентская плата");
        assert_eq!(config.driver.labels.speed, "Speed");
    }

    #[test]
    fn reads_browser_options() {
        let config = config_from(&[
            ("DRIVER", "browser"),
            ("HEADLESS", "false"),
            ("PAGE_LOAD_STRATEGY", "normal"),
            ("BLOCK_CSS", "0"),
            ("CHROME_PATH", "/opt/chrome/chrome"),
            ("WAIT_TIMEOUT_SECONDS", "40"),
            ("USER_AGENT", "Mozilla/5.0"),
        ])
        .expect("config");

        let DriverKind::Browser(browser) = config.driver.kind else {
            panic!("expected browser driver");
        };
        assert!(!browser.headless);
        assert_eq!(browser.load_strategy, LoadStrategy::Normal);
        assert!(browser.block_images);
        assert!(!browser.block_css);
        assert!(browser.block_fonts);
        assert_eq!(browser.chrome_path, Some(PathBuf::from("/opt/chrome/chrome")));
        assert_eq!(browser.request_timeout, Duration::from_secs(40));
        assert_eq!(browser.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[test]
    fn credentials_key_falls_back_to_legacy_name() {
        let config = config_from(&[("GOOGLE_CREDENTIALS_JSON", "creds.json")]).expect("config");
        assert_eq!(config.google_credentials, Some(PathBuf::from("creds.json")));
    }

    #[test]
    fn invalid_timeout_falls_back() {
        let config = config_from(&[("WAIT_TIMEOUT_SECONDS", "soon")]).expect("config");
        assert_eq!(config.wait_timeout, Duration::from_secs(15));

        let config = config_from(&[("WAIT_TIMEOUT_SECONDS", "0")]).expect("config");
        assert_eq!(config.wait_timeout, Duration::from_secs(1));
    }

    #[test]
    fn rejects_unknown_driver_and_bad_selector() {
        assert!(config_from(&[("DRIVER", "selenium")]).is_err());
        assert!(config_from(&[("PAGE_LOAD_STRATEGY", "lazy")]).is_err());
        assert!(config_from(&[("CARD_SELECTOR", "div[")]).is_err());
        assert!(config_from(&[("WORKERS", "0")]).is_err());
    }

    #[test]
    fn parses_booleans() {
        assert!(parse_bool(Some(" ON "), false));
        assert!(parse_bool(Some("1"), false));
        assert!(!parse_bool(Some("off"), true));
        assert!(!parse_bool(Some(""), true));
        assert!(parse_bool(None, true));
    }

    #[test]
    fn parses_worker_counts() {
        assert_eq!(parse_workers("3").expect("workers"), 3);
        assert!(parse_workers("-1").is_err());
        assert!(parse_workers("many").is_err());
    }
}
