//! Driver and card trait definitions

use async_trait::async_trait;
use std::time::Duration;

use super::{CheckError, CheckResult};

/// A content card located on a rendered page
pub trait ContentCard {
    /// Whether the card holds a leaf whose whitespace-normalised text is exactly `text`
    fn has_leaf(&self, text: &str) -> bool;

    /// Structured heading-like field, when the page renders one
    fn heading(&self) -> Option<String>;

    /// All visible text of the card, one text fragment per line
    fn full_text(&self) -> String;
}

/// Trait for implementing a page driver
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` and classify the provider cards found on it
    async fn check(&self, url: &str, timeout: Duration) -> Result<CheckResult, CheckError>;

    /// Get the driver name for logs
    fn name(&self) -> &'static str;

    /// Release whatever the driver holds open
    async fn close(&self) {}
}

/// Builds one independent driver per worker
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn build(&self) -> Result<Box<dyn PageDriver>, anyhow::Error>;
}
