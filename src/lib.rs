//! FeeWatch - provider listing monitor
//!
//! Loads provider-listing pages, finds tariff cards that no longer show the
//! subscription fee, records them in a spreadsheet and escalates repeated
//! failures to a chat.

pub mod checker;
pub mod config;
pub mod escalation;
pub mod logging;
pub mod notify;
pub mod runner;
pub mod storage;
pub mod url_source;

use std::sync::Arc;
use tracing::{error, info};

use checker::DriverBuilder;
use config::Config;
use escalation::EscalationTracker;
use notify::{SheetsReporter, TelegramAlerter};
use runner::{RunSettings, Runner, EXIT_CONFIG};

/// Command-line overrides for a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub workers: Option<usize>,
    pub group: Option<String>,
}

/// Run one batch and return the process exit code
pub async fn run(options: RunOptions) -> i32 {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err:#}");
            return EXIT_CONFIG;
        }
    };

    if let Err(err) = logging::init_logging(config.log_dir.as_deref()) {
        eprintln!("Failed to set up logging: {err:#}");
    }

    let groups = match url_source::load_groups(&config.urls_path)
        .and_then(|groups| url_source::select_groups(groups, options.group.as_deref()))
    {
        Ok(groups) => groups,
        Err(err) => {
            error!("{:#}", anyhow::Error::from(err));
            return EXIT_CONFIG;
        }
    };

    let settings = RunSettings {
        workers: options.workers.unwrap_or(config.workers).max(1),
        page_timeout: config.wait_timeout,
    };
    info!(
        "Starting run: {} group(s), {} worker(s), {} driver, timeout {}s",
        groups.len(),
        settings.workers,
        config.driver.kind.name(),
        settings.page_timeout.as_secs()
    );
    info!("Escalation store: {}", config.stats_file.display());

    let alerts = Arc::new(TelegramAlerter::new(
        config.bot_token.clone(),
        config.chat_id.clone(),
        config.alerts_enabled,
        config.success_alerts_enabled,
    ));
    let reports = Arc::new(SheetsReporter::new(
        config.sheet_id.clone(),
        config.google_credentials.clone(),
        config.worksheet_title.clone(),
    ));
    let tracker = Arc::new(EscalationTracker::new(config.stats_file.clone()));
    let drivers = Arc::new(DriverBuilder::new(config.driver.clone()));

    let summary = Runner::new(drivers, tracker, alerts, reports, settings)
        .run(&groups)
        .await;
    summary.exit_code()
}
