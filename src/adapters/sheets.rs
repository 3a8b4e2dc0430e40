use crate::config::toml_config::{credential_present, SheetsConfig};
use crate::domain::ports::SheetBackend;
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Spreadsheet REST backend (Sheets v4 URL layout, Bearer auth).
#[derive(Debug, Clone)]
pub struct SheetsClient {
    client: Client,
    endpoint: String,
    spreadsheet_id: String,
    access_token: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    row_count: Option<usize>,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint().trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            access_token: config.access_token.clone(),
            timeout: config.timeout(),
        }
    }

    /// `segments` 會逐段做 URL 編碼（範圍中的空白、引號等）
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| ReconcileError::InvalidConfigValueError {
            field: "sheets.endpoint".to_string(),
            value: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| ReconcileError::config("sheets.endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        let last = format!("{}{}", range, suffix);
        self.url(&["v4", "spreadsheets", &self.spreadsheet_id, "values", &last])
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        if !credential_present(&self.spreadsheet_id) {
            return Err(ReconcileError::config(
                "sheets.spreadsheet_id is not set; the record store cannot be reached",
            ));
        }
        if !credential_present(&self.access_token) {
            return Err(ReconcileError::config(
                "sheets.access_token is not set; the record store cannot be reached",
            ));
        }
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, ReconcileError>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("⏱️ Sheet {} timed out after {:?}", what, self.timeout);
                return Err(ReconcileError::transport(format!(
                    "sheet {} timed out after {}s",
                    what,
                    self.timeout.as_secs()
                )));
            }
        };

        if !status.is_success() {
            return Err(ReconcileError::protocol(format!(
                "sheet {} returned HTTP {}: {}",
                what,
                status,
                remote_error_message(&body)
            )));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ReconcileError::protocol(format!("sheet {}: unreadable body ({})", what, e)))
    }

    async fn sheet_properties(&self, sheet: &str) -> Result<SheetProperties> {
        let mut url = self.url(&["v4", "spreadsheets", &self.spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");

        let value = self
            .send(self.request(Method::GET, url)?, "metadata read")
            .await?;
        let meta: SpreadsheetMeta = serde_json::from_value(value).map_err(|e| {
            ReconcileError::protocol(format!("unexpected spreadsheet metadata: {}", e))
        })?;

        meta.sheets
            .into_iter()
            .map(|entry| entry.properties)
            .find(|props| props.title == sheet)
            .ok_or_else(|| ReconcileError::not_found(format!("Sheet '{}' does not exist", sheet)))
    }
}

#[async_trait]
impl SheetBackend for SheetsClient {
    fn identity(&self) -> &str {
        &self.spreadsheet_id
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let mut url = self.values_url(range, "")?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "FORMATTED_VALUE")
            .append_pair("majorDimension", "ROWS");

        tracing::debug!("📥 Reading {}", range);
        let value = self.send(self.request(Method::GET, url)?, "read").await?;
        let range_value: ValueRange = serde_json::from_value(value)
            .map_err(|e| ReconcileError::protocol(format!("unexpected value range: {}", e)))?;

        Ok(range_value
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let mut url = self.values_url(range, "")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");

        tracing::debug!("✏️ Writing {} rows to {}", rows.len(), range);
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.send(self.request(Method::PUT, url)?.json(&body), "update")
            .await?;
        Ok(())
    }

    async fn append_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<Option<String>> {
        let mut url = self.values_url(range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");

        tracing::debug!("➕ Appending {} rows to {}", rows.len(), range);
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        let value = self
            .send(self.request(Method::POST, url)?.json(&body), "append")
            .await?;

        // 空回應代表沒有回報範圍
        if value.is_null() {
            return Ok(None);
        }
        let response: AppendResponse = serde_json::from_value(value)
            .map_err(|e| ReconcileError::protocol(format!("unexpected append response: {}", e)))?;
        Ok(response.updates.and_then(|u| u.updated_range))
    }

    async fn clear_values(&self, range: &str) -> Result<()> {
        let url = self.values_url(range, ":clear")?;
        tracing::debug!("🧹 Clearing {}", range);
        self.send(self.request(Method::POST, url)?.json(&json!({})), "clear")
            .await?;
        Ok(())
    }

    async fn sheet_row_count(&self, sheet: &str) -> Result<usize> {
        let props = self.sheet_properties(sheet).await?;
        props
            .grid_properties
            .and_then(|g| g.row_count)
            .ok_or_else(|| {
                ReconcileError::protocol(format!("sheet '{}' metadata has no rowCount", sheet))
            })
    }

    async fn set_sheet_row_count(&self, sheet: &str, rows: usize) -> Result<()> {
        let props = self.sheet_properties(sheet).await?;
        let batch_segment = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(&["v4", "spreadsheets", &batch_segment])?;

        let body = json!({
            "requests": [{
                "updateSheetProperties": {
                    "properties": {
                        "sheetId": props.sheet_id,
                        "gridProperties": { "rowCount": rows }
                    },
                    "fields": "gridProperties.rowCount"
                }
            }]
        });

        tracing::info!("📏 Setting '{}' row capacity to {}", props.title, rows);
        self.send(self.request(Method::POST, url)?.json(&body), "batch update")
            .await?;
        Ok(())
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// 從 `{"error": {"message": ...}}` 取出錯誤訊息，取不到就回傳原文
fn remote_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(300).collect())
}
