//! URL groups loaded from a directory of text files or a workbook
//!
//! - directory: each `*.txt` file is a group named after the file stem
//! - workbook: each sheet is a group; URLs sit in the first column
//!
//! Blank entries and entries starting with `#` are skipped.

use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type UrlGroups = BTreeMap<String, Vec<String>>;

const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

#[derive(Error, Debug)]
pub enum UrlSourceError {
    #[error("URL directory or workbook not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported URL source (expected a directory or workbook): {0}")]
    Unsupported(PathBuf),
    #[error("No URL groups found")]
    Empty,
    #[error("Group '{name}' not found. Available: {available}")]
    UnknownGroup { name: String, available: String },
    #[error(transparent)]
    Read(#[from] anyhow::Error),
}

pub fn load_groups(path: &Path) -> Result<UrlGroups, UrlSourceError> {
    if path.is_dir() {
        return Ok(read_text_dir(path)?);
    }
    if !path.is_file() {
        return Err(UrlSourceError::NotFound(path.to_path_buf()));
    }
    if is_workbook(path) {
        return Ok(read_workbook(path)?);
    }
    Err(UrlSourceError::Unsupported(path.to_path_buf()))
}

/// Narrow `groups` to `name`, or keep them all
pub fn select_groups(groups: UrlGroups, name: Option<&str>) -> Result<UrlGroups, UrlSourceError> {
    if groups.is_empty() {
        return Err(UrlSourceError::Empty);
    }

    let Some(name) = name else {
        return Ok(groups);
    };

    match groups.get(name) {
        Some(urls) => Ok(BTreeMap::from([(name.to_string(), urls.clone())])),
        None => Err(UrlSourceError::UnknownGroup {
            name: name.to_string(),
            available: groups.keys().cloned().collect::<Vec<_>>().join(", "),
        }),
    }
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn clean_entry(raw: &str) -> Option<String> {
    let entry = raw.trim();
    if entry.is_empty() || entry.starts_with('#') {
        None
    } else {
        Some(entry.to_string())
    }
}

fn read_text_dir(dir: &Path) -> Result<UrlGroups, anyhow::Error> {
    let pattern = dir.join("*.txt");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| anyhow!("URL directory path is not valid UTF-8: {}", dir.display()))?;

    let mut files: Vec<PathBuf> = glob::glob(pattern)
        .context("Invalid URL directory pattern")?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut groups = UrlGroups::new();
    for file in files {
        let Some(group) = file.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let contents = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read URL list {}", file.display()))?;
        let urls: Vec<String> = contents.lines().filter_map(clean_entry).collect();
        if !urls.is_empty() {
            groups.insert(group.to_string(), urls);
        }
    }
    Ok(groups)
}

fn read_workbook(path: &Path) -> Result<UrlGroups, anyhow::Error> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let mut groups = UrlGroups::new();
    for sheet in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet)
            .with_context(|| format!("Failed to read sheet '{}'", sheet))?;

        // Ranges start at the first used cell; a sheet whose data begins
        // right of column A has no URL column.
        let Some((_, first_column)) = range.start() else {
            continue;
        };
        if first_column != 0 {
            continue;
        }

        let urls: Vec<String> = range
            .rows()
            .filter_map(|row| row.first())
            .filter_map(cell_text)
            .filter_map(|text| clean_entry(&text))
            .collect();
        if !urls.is_empty() {
            groups.insert(sheet, urls);
        }
    }
    Ok(groups)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}
