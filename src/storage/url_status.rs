use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "FeeWatch";
const URL_STATUS_FILENAME: &str = "url-status.json";

/// Escalation state persisted per URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlStatus {
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default, rename = "first_failure_ts")]
    pub first_failure_timestamp: Option<String>,
    #[serde(default, rename = "last_check_ts")]
    pub last_check_timestamp: Option<String>,
}

pub type StatusMap = BTreeMap<String, UrlStatus>;

pub fn default_status_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not determine data directory")?;
    Ok(data_dir.join(APP_DIR_NAME).join(URL_STATUS_FILENAME))
}

/// Read the whole store. A missing file is an empty store; so is one that no
/// longer parses, which is logged and then overwritten by the next save.
pub fn load_statuses(path: &Path) -> Result<StatusMap> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StatusMap::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    if contents.trim().is_empty() {
        return Ok(StatusMap::new());
    }

    match serde_json::from_str(&contents) {
        Ok(statuses) => Ok(statuses),
        Err(err) => {
            tracing::warn!("Ignoring unreadable status store {}: {}", path.display(), err);
            Ok(StatusMap::new())
        }
    }
}

pub fn save_statuses(path: &Path, statuses: &StatusMap) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create status store directory")?;
    }

    let payload =
        serde_json::to_string_pretty(statuses).context("Failed to serialize status store")?;
    fs::write(path, payload).context("Failed to write status store")?;
    Ok(())
}
