//! Google Sheets client.
//!
//! Uses Google Sheets API v4 for value reads/writes and `batchUpdate` for
//! structural changes (adding sheets, deleting rows).

use super::client::{SheetData, SheetsClient};
use crate::error::{DalError, DalResult};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Google Sheets specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSheetsConfig {
    /// Spreadsheet (document) ID holding every sheet.
    pub spreadsheet_id: String,
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Pre-issued access token.
    pub access_token: Option<String>,
    /// Refresh token used to renew the access token.
    pub refresh_token: Option<String>,
    /// Base URL for the Sheets API (e.g. `https://sheets.googleapis.com`).
    pub api_base_url: String,
    /// Base URL for Google OAuth2 (e.g. `https://oauth2.googleapis.com`).
    pub oauth_base_url: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for GoogleSheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            access_token: None,
            refresh_token: None,
            api_base_url: "https://sheets.googleapis.com".to_string(),
            oauth_base_url: "https://oauth2.googleapis.com".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// OAuth2 tokens.
#[derive(Debug, Clone)]
struct OAuthTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<SystemTime>,
}

/// Sheets API response structures.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
    #[serde(rename = "gridProperties")]
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
struct GridProperties {
    #[serde(rename = "rowCount")]
    row_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Google Sheets client.
pub struct GoogleSheetsClient {
    config: GoogleSheetsConfig,
    client: Client,
    tokens: Arc<RwLock<Option<OAuthTokens>>>,
    sheet_ids: Arc<RwLock<HashMap<String, i64>>>,
}

impl GoogleSheetsClient {
    /// Creates a client. Fails with `Configuration` when the spreadsheet ID or
    /// every credential is missing.
    pub fn new(config: GoogleSheetsConfig) -> DalResult<Self> {
        if config.spreadsheet_id.trim().is_empty() {
            return Err(DalError::Configuration(
                "spreadsheet_id is not set".to_string(),
            ));
        }
        let access = config.access_token.clone().filter(|t| !t.is_empty());
        let refresh = config.refresh_token.clone().filter(|t| !t.is_empty());
        let tokens = match (access, refresh) {
            (None, None) => {
                return Err(DalError::Configuration(
                    "no spreadsheet credentials: set access_token or refresh_token".to_string(),
                ));
            }
            (Some(access_token), refresh_token) => OAuthTokens {
                access_token,
                refresh_token,
                expires_at: None,
            },
            // Only a refresh token: force a refresh on first use.
            (None, Some(refresh_token)) => OAuthTokens {
                access_token: String::new(),
                refresh_token: Some(refresh_token),
                expires_at: Some(SystemTime::UNIX_EPOCH),
            },
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DalError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            tokens: Arc::new(RwLock::new(Some(tokens))),
            sheet_ids: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Replaces the current tokens (e.g., loaded from storage).
    pub async fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let tokens = OAuthTokens {
            access_token,
            refresh_token,
            expires_at: None,
        };
        *self.tokens.write().await = Some(tokens);
    }

    /// Gets the current access token, refreshing if needed.
    async fn get_access_token(&self) -> DalResult<String> {
        let (access_token, expired) = {
            let guard = self.tokens.read().await;
            let tokens = guard
                .as_ref()
                .ok_or_else(|| DalError::Configuration("not authenticated".to_string()))?;

            let expired = tokens
                .expires_at
                .is_some_and(|exp| SystemTime::now() > exp);

            (tokens.access_token.clone(), expired)
        };

        if expired {
            return self.refresh_token().await;
        }

        Ok(access_token)
    }

    /// Refreshes the access token.
    async fn refresh_token(&self) -> DalResult<String> {
        let refresh_token = {
            let tokens = self.tokens.read().await;
            tokens
                .as_ref()
                .and_then(|t| t.refresh_token.clone())
                .ok_or_else(|| DalError::Configuration("no refresh token available".to_string()))?
        };

        debug!("Refreshing Google Sheets access token");

        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base_url))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| DalError::ExternalService(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(DalError::Configuration(format!("token refresh failed: {error}")));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            DalError::ExternalService(format!("failed to parse token response: {e}"))
        })?;

        let expires_at = token_response
            .expires_in
            .map(|secs| SystemTime::now() + Duration::from_secs(secs.saturating_sub(60))); // 60s buffer

        *self.tokens.write().await = Some(OAuthTokens {
            access_token: token_response.access_token.clone(),
            refresh_token: token_response.refresh_token.or(Some(refresh_token)),
            expires_at,
        });

        Ok(token_response.access_token)
    }

    fn spreadsheet_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.config.api_base_url,
            urlencoding::encode(&self.config.spreadsheet_id)
        )
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/values/{}", self.spreadsheet_url(), urlencoding::encode(range))
    }

    /// Lists sheet properties, refreshing the title → sheetId cache.
    async fn sheet_properties(&self) -> DalResult<Vec<SheetProperties>> {
        let access_token = self.get_access_token().await?;
        let response = self
            .client
            .get(self.spreadsheet_url())
            .bearer_auth(&access_token)
            .query(&[("fields", "sheets.properties")])
            .send()
            .await
            .map_err(|e| DalError::ExternalService(format!("sheet listing failed: {e}")))?;
        let spreadsheet: Spreadsheet = parse_json(response, "sheet listing").await?;

        let properties: Vec<SheetProperties> =
            spreadsheet.sheets.into_iter().map(|s| s.properties).collect();
        let mut ids = self.sheet_ids.write().await;
        ids.clear();
        for p in &properties {
            ids.insert(p.title.clone(), p.sheet_id);
        }
        Ok(properties)
    }

    async fn sheet_id(&self, sheet: &str) -> DalResult<i64> {
        if let Some(id) = self.sheet_ids.read().await.get(sheet) {
            return Ok(*id);
        }
        self.sheet_properties()
            .await?
            .into_iter()
            .find(|p| p.title == sheet)
            .map(|p| p.sheet_id)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))
    }

    async fn batch_update(&self, requests: Value, what: &str) -> DalResult<()> {
        let access_token = self.get_access_token().await?;
        let response = self
            .client
            .post(format!("{}:batchUpdate", self.spreadsheet_url()))
            .bearer_auth(&access_token)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| DalError::ExternalService(format!("{what} failed: {e}")))?;
        ensure_success(response, what).await
    }

    async fn delete_dimension(&self, sheet: &str, start_index: usize, end_index: usize) -> DalResult<()> {
        let sheet_id = self.sheet_id(sheet).await?;
        let request = serde_json::json!([{
            "deleteDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": start_index,
                    "endIndex": end_index
                }
            }
        }]);
        self.batch_update(request, "row deletion").await
    }

    async fn write_range(&self, range: &str, rows: Vec<Vec<Value>>, what: &str) -> DalResult<()> {
        let access_token = self.get_access_token().await?;
        let response = self
            .client
            .put(self.values_url(range))
            .bearer_auth(&access_token)
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| DalError::ExternalService(format!("{what} failed: {e}")))?;
        ensure_success(response, what).await
    }
}

#[async_trait]
impl SheetsClient for GoogleSheetsClient {
    fn provider_name(&self) -> &'static str {
        "Google Sheets"
    }

    async fn fetch(&self, sheet: &str) -> DalResult<SheetData> {
        let access_token = self.get_access_token().await?;
        debug!(sheet, "Fetching sheet values");

        let response = self
            .client
            .get(self.values_url(&a1_sheet(sheet)))
            .bearer_auth(&access_token)
            .query(&[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                // Dates would otherwise arrive as serial day numbers.
                ("dateTimeRenderOption", "FORMATTED_STRING"),
                ("majorDimension", "ROWS"),
            ])
            .send()
            .await
            .map_err(|e| DalError::ExternalService(format!("sheet read failed: {e}")))?;

        // The API answers 400 "Unable to parse range" for unknown sheet titles.
        if matches!(response.status().as_u16(), 400 | 404) {
            return Err(DalError::NotFound(format!("sheet {sheet}")));
        }
        let range: ValueRange = parse_json(response, "sheet read").await?;

        let mut rows = range.values.into_iter();
        let header = rows
            .next()
            .unwrap_or_default()
            .iter()
            .map(|cell| match cell {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect();
        Ok(SheetData {
            header,
            rows: rows.collect(),
        })
    }

    async fn append_rows(&self, sheet: &str, rows: Vec<Vec<Value>>) -> DalResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let access_token = self.get_access_token().await?;
        let count = rows.len();

        let response = self
            .client
            .post(format!("{}:append", self.values_url(&a1_sheet(sheet))))
            .bearer_auth(&access_token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&serde_json::json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| DalError::ExternalService(format!("append failed: {e}")))?;
        ensure_success(response, "append").await?;

        debug!(sheet, count, "Appended rows");
        Ok(())
    }

    async fn update_row(&self, sheet: &str, row_number: usize, values: Vec<Value>) -> DalResult<()> {
        let range = format!("{}!A{row_number}", a1_sheet(sheet));
        self.write_range(&range, vec![values], "row update").await
    }

    async fn delete_rows(&self, sheet: &str, start_row: usize, count: usize) -> DalResult<()> {
        if count == 0 {
            return Ok(());
        }
        if start_row < 2 {
            return Err(DalError::Permission("the header row cannot be deleted".to_string()));
        }
        // deleteDimension takes 0-based, end-exclusive indices.
        self.delete_dimension(sheet, start_row - 1, start_row - 1 + count)
            .await?;
        info!(sheet, start_row, count, "Deleted rows");
        Ok(())
    }

    async fn truncate(&self, sheet: &str) -> DalResult<()> {
        let properties = self.sheet_properties().await?;
        let row_count = properties
            .iter()
            .find(|p| p.title == sheet)
            .ok_or_else(|| DalError::NotFound(format!("sheet {sheet}")))?
            .grid_properties
            .as_ref()
            .and_then(|g| g.row_count)
            .unwrap_or(0);
        if row_count <= 1 {
            return Ok(());
        }
        let end_index = usize::try_from(row_count)
            .map_err(|_| DalError::ExternalService(format!("row count out of range: {row_count}")))?;
        self.delete_dimension(sheet, 1, end_index).await?;
        info!(sheet, "Truncated sheet");
        Ok(())
    }

    async fn ensure_sheet(&self, sheet: &str, header: &[String]) -> DalResult<bool> {
        let mut created = false;
        let exists = self
            .sheet_properties()
            .await?
            .iter()
            .any(|p| p.title == sheet);
        if !exists {
            let request = serde_json::json!([{ "addSheet": { "properties": { "title": sheet } } }]);
            self.batch_update(request, "sheet creation").await?;
            self.sheet_ids.write().await.remove(sheet);
            info!(sheet, "Created sheet");
            created = true;
        }

        if header.is_empty() {
            return Ok(created);
        }
        let current = self.fetch(sheet).await?;
        if current.header.iter().all(String::is_empty) {
            let row = header.iter().map(|h| Value::String(h.clone())).collect();
            self.write_range(&format!("{}!A1", a1_sheet(sheet)), vec![row], "header write")
                .await?;
            debug!(sheet, "Wrote header row");
            created = true;
        }
        Ok(created)
    }
}

/// Quotes a sheet title for A1 notation when it holds anything but word
/// characters.
fn a1_sheet(sheet: &str) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

async fn ensure_success(response: Response, what: &str) -> DalResult<()> {
    if !response.status().is_success() {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        return Err(DalError::ExternalService(format!(
            "{what} failed ({status}): {error}"
        )));
    }
    Ok(())
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> DalResult<T> {
    if !response.status().is_success() {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        return Err(DalError::ExternalService(format!(
            "{what} failed ({status}): {error}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| DalError::ExternalService(format!("failed to parse {what} response: {e}")))
}
