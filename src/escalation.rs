//! Failure escalation
//!
//! Tracks consecutive failing checks per URL and decides when a failure is
//! worth a notification. Alerts fire on the 1st, 4th and 12th consecutive
//! failure, then on every 10th from the 20th on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::storage::{load_statuses, save_statuses, UrlStatus};

const EARLY_ALERT_COUNTS: [u32; 3] = [1, 4, 12];
const REPEAT_FROM: u32 = 20;
const REPEAT_EVERY: u32 = 10;

pub fn should_alert_for_failure(count: u32) -> bool {
    EARLY_ALERT_COUNTS.contains(&count) || (count >= REPEAT_FROM && count % REPEAT_EVERY == 0)
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

/// Apply one check outcome to a status, returning whether to alert now
fn apply_check(status: &mut UrlStatus, is_failure: bool, checked_at: String) -> bool {
    if is_failure {
        if status.consecutive_failures == 0 {
            status.first_failure_timestamp = Some(checked_at.clone());
        }
        status.consecutive_failures += 1;
        status.last_check_timestamp = Some(checked_at);
        should_alert_for_failure(status.consecutive_failures)
    } else {
        status.consecutive_failures = 0;
        status.first_failure_timestamp = None;
        status.last_check_timestamp = Some(checked_at);
        false
    }
}

/// Sole owner of the on-disk status store
///
/// Every access is a full load-mutate-save under one lock, so workers never
/// interleave writes to the file.
pub struct EscalationTracker {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EscalationTracker {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a check for `url` and report whether an alert is due
    pub fn update(&self, url: &str, is_failure: bool) -> Result<bool> {
        self.update_at(url, is_failure, Utc::now())
    }

    pub fn update_at(&self, url: &str, is_failure: bool, now: DateTime<Utc>) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut statuses = load_statuses(&self.path)?;
        let status = statuses.entry(url.to_string()).or_default();
        let alert_now = apply_check(status, is_failure, format_timestamp(now));
        tracing::debug!(
            url = %url,
            failures = status.consecutive_failures,
            alert_now,
            "Escalation state updated"
        );

        save_statuses(&self.path, &statuses)?;
        Ok(alert_now)
    }

    /// Current streak for `url`; 0 when the URL was never seen
    pub fn consecutive_failures(&self, url: &str) -> Result<u32> {
        Ok(self.status(url)?.consecutive_failures)
    }

    pub fn status(&self, url: &str) -> Result<UrlStatus> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let statuses = load_statuses(&self.path)?;
        Ok(statuses.get(url).cloned().unwrap_or_default())
    }
}

/// `update` on the blocking pool, for callers running on the async runtime
pub async fn record_check(
    tracker: Arc<EscalationTracker>,
    url: &str,
    is_failure: bool,
) -> Result<bool> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || tracker.update(&url, is_failure))
        .await
        .context("Escalation update task panicked")?
}

pub async fn current_streak(tracker: Arc<EscalationTracker>, url: &str) -> Result<u32> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || tracker.consecutive_failures(&url))
        .await
        .context("Escalation read task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const URL: &str = "https://example.com/providers";

    fn tracker_in(dir: &tempfile::TempDir) -> EscalationTracker {
        EscalationTracker::new(dir.path().join("status.json"))
    }

    #[test]
    fn schedule_matches_for_first_fifty_counts() {
        for n in 0..50u32 {
            let expected = matches!(n, 1 | 4 | 12 | 20 | 30 | 40);
            assert_eq!(should_alert_for_failure(n), expected, "count {n}");
        }
        assert!(should_alert_for_failure(100));
        assert!(!should_alert_for_failure(101));
        assert!(!should_alert_for_failure(10));
    }

    #[test]
    fn first_four_failures_alert_on_first_and_fourth() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tracker = tracker_in(&temp);

        let alerts: Vec<bool> = (0..4)
            .map(|_| tracker.update(URL, true).expect("update"))
            .collect();
        assert_eq!(alerts, vec![true, false, false, true]);
    }

    #[test]
    fn consecutive_failures_follow_schedule() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tracker = tracker_in(&temp);

        for n in 1..=45u32 {
            let alert = tracker.update(URL, true).expect("update");
            assert_eq!(alert, should_alert_for_failure(n), "failure {n}");
            assert_eq!(tracker.consecutive_failures(URL).expect("read"), n);
        }
    }

    #[test]
    fn success_resets_regardless_of_history() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tracker = tracker_in(&temp);

        assert!(!tracker.update(URL, false).expect("fresh success"));
        assert_eq!(tracker.consecutive_failures(URL).expect("read"), 0);

        for _ in 0..7 {
            tracker.update(URL, true).expect("failure");
        }
        assert!(!tracker.update(URL, false).expect("recovery"));

        let status = tracker.status(URL).expect("status");
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.first_failure_timestamp.is_none());
        assert!(status.last_check_timestamp.is_some());

        // the streak starts over, so the next failure alerts again
        assert!(tracker.update(URL, true).expect("new streak"));
    }

    #[test]
    fn timestamps_track_streak_start_and_last_check() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tracker = tracker_in(&temp);
        let first = Utc.with_ymd_and_hms(2025, 1, 5, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 1, 5, 11, 30, 0).unwrap();

        tracker.update_at(URL, true, first).expect("first");
        tracker.update_at(URL, true, second).expect("second");

        let status = tracker.status(URL).expect("status");
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(
            status.first_failure_timestamp.as_deref(),
            Some("2025-01-05 10:00:00 UTC")
        );
        assert_eq!(
            status.last_check_timestamp.as_deref(),
            Some("2025-01-05 11:30:00 UTC")
        );
    }

    #[test]
    fn urls_are_tracked_independently_and_survive_reopen() {
        let temp = tempfile::tempdir().expect("temp dir");
        let other = "https://example.com/other";
        {
            let tracker = tracker_in(&temp);
            tracker.update(URL, true).expect("update");
            tracker.update(URL, true).expect("update");
            tracker.update(other, false).expect("update");
        }

        let reopened = tracker_in(&temp);
        assert_eq!(reopened.consecutive_failures(URL).expect("read"), 2);
        assert_eq!(reopened.consecutive_failures(other).expect("read"), 0);
        assert_eq!(
            reopened
                .consecutive_failures("https://example.com/unknown")
                .expect("read"),
            0
        );
    }

    #[test]
    fn concurrent_updates_do_not_lose_writes() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tracker = std::sync::Arc::new(tracker_in(&temp));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let url = format!("https://example.com/{i}");
                    tracker.update(&url, true).expect("update")
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().expect("join"));
        }
        for i in 0..8 {
            let url = format!("https://example.com/{i}");
            assert_eq!(tracker.consecutive_failures(&url).expect("read"), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn async_records_from_many_tasks_keep_every_count() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tracker = Arc::new(tracker_in(&temp));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..12 {
            let tracker = tracker.clone();
            tasks.spawn(async move {
                let url = format!("https://example.com/{}", i % 3);
                record_check(tracker, &url, true).await.expect("record")
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.expect("join");
        }

        for i in 0..3 {
            let url = format!("https://example.com/{i}");
            assert_eq!(current_streak(tracker.clone(), &url).await.expect("read"), 4);
        }
        assert!(record_check(tracker.clone(), URL, true).await.expect("first"));
        assert!(!record_check(tracker, URL, false).await.expect("reset"));
    }
}
