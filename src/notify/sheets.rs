//! Google Sheets report appender
//!
//! The credentials file is either a service-account key, exchanged for an
//! access token through a signed RS256 assertion, or an authorized-user file
//! whose refresh token is exchanged instead. A fresh token is fetched on
//! every append.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ReportSink;
use crate::escalation::format_timestamp;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const NEW_SHEET_ROWS: u32 = 1000;
const NEW_SHEET_COLUMNS: u32 = 10;

pub fn sheet_url(sheet_id: Option<&str>) -> Option<String> {
    sheet_id
        .filter(|id| !id.is_empty())
        .map(|id| format!("https://docs.google.com/spreadsheets/d/{id}"))
}

/// Row layout: URL, UTC timestamp, comma-separated provider names
pub fn sheet_row(url: &str, at: DateTime<Utc>, missing: &[String]) -> Vec<String> {
    let providers = if missing.is_empty() {
        "-".to_string()
    } else {
        missing.join(", ")
    };
    vec![url.to_string(), format_timestamp(at), providers]
}

pub struct SheetsReporter {
    client: reqwest::Client,
    sheet_id: Option<String>,
    credentials_path: Option<PathBuf>,
    worksheet_title: Option<String>,
}

impl SheetsReporter {
    pub fn new(
        sheet_id: Option<String>,
        credentials_path: Option<PathBuf>,
        worksheet_title: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            sheet_id,
            credentials_path,
            worksheet_title,
        }
    }

    async fn append_row(
        &self,
        sheet_id: &str,
        credentials_path: &Path,
        row: &[String],
    ) -> Result<(), anyhow::Error> {
        let credentials = load_credentials(credentials_path).await?;
        let access_token = self.access_token(&credentials).await?;
        let worksheet = self.resolve_worksheet(sheet_id, &access_token).await?;

        let range = format!("{}!A1:append", quote_sheet_title(&worksheet));
        let mut endpoint = sheets_endpoint(&[sheet_id, "values", &range])?;
        endpoint
            .query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&access_token)
            .json(&serde_json::json!({ "values": [row] }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Sheets append returned status {}: {}", status, body));
        }

        Ok(())
    }

    async fn access_token(&self, credentials: &GoogleCredentials) -> Result<String, anyhow::Error> {
        let request = match credentials {
            GoogleCredentials::ServiceAccount(key) => {
                let assertion = signed_assertion(key, Utc::now())?;
                self.client
                    .post(key.token_uri())
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            }
            GoogleCredentials::AuthorizedUser(user) => self.client.post(TOKEN_ENDPOINT).form(&[
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ]),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Google token exchange returned status {}: {}", status, body));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// Configured worksheet (created when absent) or the first sheet
    async fn resolve_worksheet(
        &self,
        sheet_id: &str,
        access_token: &str,
    ) -> Result<String, anyhow::Error> {
        let mut endpoint = sheets_endpoint(&[sheet_id])?;
        endpoint
            .query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let response = self
            .client
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Sheets metadata returned status: {}",
                response.status()
            ));
        }

        let metadata: SpreadsheetMetadata = response.json().await?;
        let titles: Vec<String> = metadata
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect();

        match self.worksheet_title.as_deref() {
            Some(title) if titles.iter().any(|existing| existing == title) => Ok(title.to_string()),
            Some(title) => {
                self.add_worksheet(sheet_id, access_token, title).await?;
                Ok(title.to_string())
            }
            None => titles
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Spreadsheet {} has no worksheets", sheet_id)),
        }
    }

    async fn add_worksheet(
        &self,
        sheet_id: &str,
        access_token: &str,
        title: &str,
    ) -> Result<(), anyhow::Error> {
        tracing::info!("Creating worksheet {:?}", title);
        let endpoint = sheets_endpoint(&[&format!("{sheet_id}:batchUpdate")])?;
        let body = serde_json::json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": NEW_SHEET_ROWS,
                            "columnCount": NEW_SHEET_COLUMNS,
                        }
                    }
                }
            }]
        });

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Sheets addSheet returned status: {}",
                response.status()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportSink for SheetsReporter {
    async fn append(&self, url: &str, at: DateTime<Utc>, missing: &[String]) -> bool {
        let (Some(sheet_id), Some(credentials_path)) =
            (self.sheet_id.as_deref(), self.credentials_path.as_deref())
        else {
            tracing::warn!("Google Sheets is not configured (SHEET_ID/GOOGLE_SERVICE_ACCOUNT_JSON)");
            return false;
        };

        let row = sheet_row(url, at, missing);
        match self.append_row(sheet_id, credentials_path, &row).await {
            Ok(()) => {
                tracing::info!("Appended row to Google Sheets: {:?}", row);
                true
            }
            Err(err) => {
                tracing::error!("Failed to append to Google Sheets: {:#}", err);
                false
            }
        }
    }

    fn report_url(&self) -> Option<String> {
        sheet_url(self.sheet_id.as_deref())
    }
}

fn sheets_endpoint(segments: &[&str]) -> Result<url::Url, anyhow::Error> {
    let mut endpoint = url::Url::parse(SHEETS_BASE_URL)?;
    endpoint
        .path_segments_mut()
        .map_err(|_| anyhow!("Sheets base URL cannot take path segments"))?
        .extend(segments);
    Ok(endpoint)
}

fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

async fn load_credentials(path: &Path) -> Result<GoogleCredentials, anyhow::Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read Google credentials {}", path.display()))?;
    parse_credentials(&content)
}

fn parse_credentials(content: &str) -> Result<GoogleCredentials, anyhow::Error> {
    serde_json::from_str(content)
        .context("Google credentials must be a service_account or authorized_user JSON file")
}

/// Self-signed JWT traded for an access token at the key's token URI
fn signed_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, anyhow::Error> {
    let issued_at = now.timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SHEETS_SCOPE,
        aud: key.token_uri(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("Service account private_key is not an RSA PEM key")?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
        .context("Failed to sign service account assertion")
}

// ---- Google API Types ----

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GoogleCredentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

impl ServiceAccountKey {
    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(TOKEN_ENDPOINT)
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}
