//! Outbound side effects: chat alerts and spreadsheet reports
//!
//! Both sinks swallow their own failures. They log and return `false`, and a
//! failed side effect never changes the outcome of a run.

mod sheets;
mod telegram;

pub use sheets::{sheet_row, sheet_url, SheetsReporter};
pub use telegram::TelegramAlerter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::escalation::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// A page is failing and the escalation schedule says to notify
    Failure,
    /// End of a run in which nothing failed
    AllClear,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, kind: AlertKind, message: &str) -> bool;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Append one failing page to the report
    async fn append(&self, url: &str, at: DateTime<Utc>, missing: &[String]) -> bool;

    /// Link to the report, for alert messages
    fn report_url(&self) -> Option<String>;
}

pub fn anomaly_message(
    url: &str,
    missing: &[String],
    consecutive_failures: u32,
    report_url: Option<&str>,
) -> String {
    let mut lines = vec![
        "Subscription fee field disappeared".to_string(),
        format!("Page: {url}"),
    ];
    if let Some(host) = host_of(url) {
        lines.push(format!("Site: {host}"));
    }
    lines.push(format!("Providers: {}", missing.join(", ")));
    lines.push(format!("Consecutive failures: {consecutive_failures}"));
    lines.push(format!("Report: {}", report_url.unwrap_or("")));
    lines.join("\n")
}

pub fn error_message(url: &str, error: &str, consecutive_failures: u32) -> String {
    [
        "Page check failed".to_string(),
        format!("Page: {url}"),
        format!("Error: {error}"),
        format!("Consecutive failures: {consecutive_failures}"),
    ]
    .join("\n")
}

pub fn all_clear_message(
    groups: &[String],
    timed_out: &[String],
    report_url: Option<&str>,
    at: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        "Check passed".to_string(),
        format!("Groups: {}", groups.join(", ")),
        format!("Report: {}", report_url.unwrap_or("")),
        format!("Checked at: {}", format_timestamp(at)),
    ];
    if !timed_out.is_empty() {
        lines.push(format!("Timed out (not counted): {}", timed_out.join(", ")));
    }
    lines.join("\n")
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}
