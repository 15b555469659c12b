//! One batch run over the selected URL groups
//!
//! Every URL is checked by its own driver, either sequentially in list order
//! or through a bounded pool of workers. Side effects (report row, escalation
//! update, alert) are dispatched by whichever worker finished the check.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::checker::{CheckError, CheckResult, DriverFactory};
use crate::escalation::{current_streak, record_check, EscalationTracker};
use crate::notify::{all_clear_message, anomaly_message, error_message, AlertKind, AlertSink, ReportSink};
use crate::url_source::UrlGroups;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURES: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// The hard per-task limit is this many page-load timeouts
const TASK_TIMEOUT_FACTOR: u32 = 4;

#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub workers: usize,
    pub page_timeout: Duration,
}

impl RunSettings {
    pub fn task_timeout(&self) -> Duration {
        self.page_timeout * TASK_TIMEOUT_FACTOR
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlOutcome {
    Passed(CheckResult),
    Anomaly(CheckResult),
    /// Page load timed out; not counted against the escalation streak
    TimedOut,
    Errored(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub groups: Vec<String>,
    pub passed: Vec<String>,
    pub anomalies: Vec<String>,
    pub errors: Vec<String>,
    pub timed_out: Vec<String>,
}

impl RunSummary {
    fn record(&mut self, url: String, outcome: &UrlOutcome) {
        match outcome {
            UrlOutcome::Passed(_) => self.passed.push(url),
            UrlOutcome::Anomaly(_) => self.anomalies.push(url),
            UrlOutcome::TimedOut => self.timed_out.push(url),
            UrlOutcome::Errored(_) => self.errors.push(url),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.anomalies.is_empty() || !self.errors.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            EXIT_FAILURES
        } else {
            EXIT_OK
        }
    }
}

pub struct Runner {
    context: Arc<RunContext>,
}

struct RunContext {
    drivers: Arc<dyn DriverFactory>,
    tracker: Arc<EscalationTracker>,
    alerts: Arc<dyn AlertSink>,
    reports: Arc<dyn ReportSink>,
    settings: RunSettings,
}

impl Runner {
    pub fn new(
        drivers: Arc<dyn DriverFactory>,
        tracker: Arc<EscalationTracker>,
        alerts: Arc<dyn AlertSink>,
        reports: Arc<dyn ReportSink>,
        settings: RunSettings,
    ) -> Self {
        Self {
            context: Arc::new(RunContext {
                drivers,
                tracker,
                alerts,
                reports,
                settings,
            }),
        }
    }

    pub async fn run(&self, groups: &UrlGroups) -> RunSummary {
        let mut summary = RunSummary {
            groups: groups.keys().cloned().collect(),
            ..RunSummary::default()
        };

        for (group, urls) in groups {
            info!("Group: {} ({} URLs)", group, urls.len());
            if self.context.settings.workers <= 1 {
                self.run_sequential(urls, &mut summary).await;
            } else {
                self.run_parallel(urls, &mut summary).await;
            }
        }

        info!(
            passed = summary.passed.len(),
            anomalies = summary.anomalies.len(),
            errors = summary.errors.len(),
            timed_out = summary.timed_out.len(),
            "Run finished"
        );

        if !summary.has_failures() {
            let message = all_clear_message(
                &summary.groups,
                &summary.timed_out,
                self.context.reports.report_url().as_deref(),
                Utc::now(),
            );
            self.context.alerts.send(AlertKind::AllClear, &message).await;
        }

        summary
    }

    async fn run_sequential(&self, urls: &[String], summary: &mut RunSummary) {
        for url in urls {
            let outcome = self.context.process(url).await;
            summary.record(url.clone(), &outcome);
        }
    }

    async fn run_parallel(&self, urls: &[String], summary: &mut RunSummary) {
        let semaphore = Arc::new(Semaphore::new(self.context.settings.workers));
        let mut tasks = JoinSet::new();

        for url in urls {
            let context = Arc::clone(&self.context);
            let semaphore = Arc::clone(&semaphore);
            let url = url.clone();
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => context.process(&url).await,
                    Err(_) => UrlOutcome::Errored("worker pool closed".to_string()),
                };
                (url, outcome)
            });
        }

        // completion order, not input order
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, outcome)) => summary.record(url, &outcome),
                Err(err) => {
                    error!("Worker task aborted: {}", err);
                    summary.errors.push(format!("<worker task: {err}>"));
                }
            }
        }
    }
}

impl RunContext {
    async fn process(&self, url: &str) -> UrlOutcome {
        let outcome = self.check(url).await;
        self.dispatch(url, &outcome).await;
        outcome
    }

    /// Only the page check runs under the hard limit; the driver is closed
    /// on every path, including when that limit fires.
    async fn check(&self, url: &str) -> UrlOutcome {
        let task_timeout = self.settings.task_timeout();

        let driver = match tokio::time::timeout(task_timeout, self.drivers.build()).await {
            Ok(Ok(driver)) => driver,
            Ok(Err(err)) => return UrlOutcome::Errored(format!("Failed to start driver: {err:#}")),
            Err(_) => {
                return UrlOutcome::Errored(format!(
                    "Driver did not start within {}s",
                    task_timeout.as_secs_f64()
                ))
            }
        };

        let checked =
            tokio::time::timeout(task_timeout, driver.check(url, self.settings.page_timeout)).await;

        if tokio::time::timeout(task_timeout, driver.close()).await.is_err() {
            warn!("URL: {} | {} driver did not close in time", url, driver.name());
        }

        match checked {
            Ok(Ok(result)) if result.is_failure() => UrlOutcome::Anomaly(result),
            Ok(Ok(result)) => UrlOutcome::Passed(result),
            Ok(Err(CheckError::Timeout { .. })) => UrlOutcome::TimedOut,
            Ok(Err(err)) => {
                error!(url = %url, error = ?err, "Page check failed");
                UrlOutcome::Errored(err.to_string())
            }
            Err(_) => UrlOutcome::Errored(format!(
                "Check did not finish within {}s",
                task_timeout.as_secs_f64()
            )),
        }
    }

    async fn dispatch(&self, url: &str, outcome: &UrlOutcome) {
        match outcome {
            UrlOutcome::Passed(result) => {
                info!(
                    "URL: {} | cards: {}, checked: {}, all ok",
                    url, result.total_cards, result.checked_cards
                );
                self.escalate(url, false).await;
            }
            UrlOutcome::Anomaly(result) => {
                warn!(
                    "URL: {} | cards: {}, checked: {}, without fee: {}",
                    url,
                    result.total_cards,
                    result.checked_cards,
                    result.missing_providers.join(", ")
                );
                self.reports
                    .append(url, Utc::now(), &result.missing_providers)
                    .await;

                if self.escalate(url, true).await {
                    let message = anomaly_message(
                        url,
                        &result.missing_providers,
                        self.streak(url).await,
                        self.reports.report_url().as_deref(),
                    );
                    self.alerts.send(AlertKind::Failure, &message).await;
                }
            }
            UrlOutcome::TimedOut => {
                warn!("URL: {} | page load timed out, skipped for this run", url);
            }
            UrlOutcome::Errored(reason) => {
                error!("URL: {} | check failed: {}", url, reason);
                if self.escalate(url, true).await {
                    let message = error_message(url, reason, self.streak(url).await);
                    self.alerts.send(AlertKind::Failure, &message).await;
                }
            }
        }
    }

    /// Update the escalation store; when the store itself fails, a failure
    /// still alerts so it is not silently lost.
    async fn escalate(&self, url: &str, is_failure: bool) -> bool {
        match record_check(Arc::clone(&self.tracker), url, is_failure).await {
            Ok(alert_now) => alert_now,
            Err(err) => {
                error!(
                    "Failed to update escalation state {} for {}: {:#}",
                    self.tracker.path().display(),
                    url,
                    err
                );
                is_failure
            }
        }
    }

    async fn streak(&self, url: &str) -> u32 {
        current_streak(Arc::clone(&self.tracker), url)
            .await
            .unwrap_or(0)
    }
}
