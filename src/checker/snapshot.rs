//! Offline driver replaying saved pages
//!
//! Each URL maps to `<dir>/<slug>.html`. The slug keeps ASCII alphanumerics,
//! drops leading and trailing separators and turns every inner run of other
//! characters into one `_`.

use anyhow::anyhow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{parse_cards, CardLabels, CardSelectors, CheckError, CheckResult, PageDriver};

pub struct SnapshotDriver {
    dir: PathBuf,
    selectors: CardSelectors,
    labels: CardLabels,
}

impl SnapshotDriver {
    pub fn new(dir: PathBuf, selectors: CardSelectors, labels: CardLabels) -> Self {
        Self {
            dir,
            selectors,
            labels,
        }
    }
}

pub fn snapshot_path(dir: &Path, url: &str) -> PathBuf {
    dir.join(format!("{}.html", slug(url)))
}

fn slug(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut pending_separator = false;
    for ch in url.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch);
        } else {
            pending_separator = true;
        }
    }
    out
}

#[async_trait]
impl PageDriver for SnapshotDriver {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn check(&self, url: &str, timeout: Duration) -> Result<CheckResult, CheckError> {
        let path = snapshot_path(&self.dir, url);
        tracing::info!("Opening snapshot for {}: {}", url, path.display());

        let body = match tokio::time::timeout(timeout, tokio::fs::read_to_string(&path)).await {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => {
                return Err(CheckError::Other(anyhow!(
                    "Failed to read snapshot {}: {}",
                    path.display(),
                    err
                )))
            }
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
}
