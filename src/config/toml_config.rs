use crate::utils::a1;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::normalize::MatchMode;
use crate::utils::validation::{
    validate_column_letter, validate_non_empty_string, validate_positive_number, validate_range,
    validate_unique_names, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 12;
pub const MAX_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 1000;
pub const DEFAULT_SCAN_MAX_PAGES: usize = 5;
pub const DEFAULT_SCAN_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_PRIORITY_CHANNEL: &str = "eBay";
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 60;
pub const DEFAULT_SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com";

/// 預設允許回傳給呼叫端的訂單狀態
pub const DEFAULT_ALLOWED_STATUSES: &[&str] = &[
    "New",
    "Pick",
    "Pack",
    "Pending Pickup",
    "Pending Dispatch",
    "Dispatched",
    "On Hold",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub orders: OrdersConfig,
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub tables: BTreeMap<String, TableSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub username: String,
    pub timeout_seconds: Option<u64>,
    pub scan_timeout_seconds: Option<u64>,
    pub scan_page_size: Option<usize>,
    pub scan_max_pages: Option<usize>,
    pub scan_window_days: Option<i64>,
    pub priority_channel: Option<String>,
    pub allowed_statuses: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub access_token: String,
    pub cache_ttl_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

/// 一張「表」：試算表中具名範圍與其固定的欄位意義
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSpec {
    pub sheet: String,
    pub first_column: Option<String>,
    pub last_column: String,
    pub header_rows: Option<usize>,
    pub key_column: String,
    pub key_match: Option<MatchMode>,
    pub timestamp_column: Option<String>,
    pub status_column: Option<String>,
    pub type_filter: Option<TypeFilter>,
    /// Field names in column order, starting at `first_column`.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Discriminator for sheets shared by several transaction types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeFilter {
    pub column: String,
    pub value: String,
}

/// Settings for the resolver's bounded scan and customer lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub page_size: usize,
    pub max_pages: usize,
    pub window_days: i64,
    pub timeout: Duration,
    pub priority_channel: String,
    pub allowed_statuses: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_SCAN_PAGE_SIZE,
            max_pages: DEFAULT_SCAN_MAX_PAGES,
            window_days: DEFAULT_SCAN_WINDOW_DAYS,
            timeout: Duration::from_secs(MAX_TIMEOUT_SECONDS),
            priority_channel: DEFAULT_PRIORITY_CHANNEL.to_string(),
            allowed_statuses: DEFAULT_ALLOWED_STATUSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 憑證是否真的有值（未替換的 `${VAR}` 視為缺少）
pub fn credential_present(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.contains("${")
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ReconcileError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReconcileError::InvalidConfigValueError {
            field: "toml_parsing".to_string(),
            value: String::new(),
            reason: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ORDER_API_KEY})；找不到的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ReconcileError::config(format!("env pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn table(&self, id: &str) -> Result<&TableSpec> {
        self.tables.get(id).ok_or_else(|| {
            ReconcileError::validation(format!(
                "Unknown table '{}'. Configured tables: {}",
                id,
                self.tables.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.orders.validate()?;
        self.sheets.validate()?;
        for (id, table) in &self.tables {
            table.validate_as(&format!("tables.{}", id))?;
        }
        Ok(())
    }
}

impl OrdersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
                .min(MAX_TIMEOUT_SECONDS),
        )
    }

    pub fn scan_settings(&self) -> ScanSettings {
        let defaults = ScanSettings::default();
        ScanSettings {
            page_size: self.scan_page_size.unwrap_or(defaults.page_size),
            max_pages: self.scan_max_pages.unwrap_or(defaults.max_pages),
            window_days: self.scan_window_days.unwrap_or(defaults.window_days),
            timeout: self
                .scan_timeout_seconds
                .map(|s| Duration::from_secs(s.min(MAX_TIMEOUT_SECONDS)))
                .unwrap_or(defaults.timeout),
            priority_channel: self
                .priority_channel
                .clone()
                .unwrap_or(defaults.priority_channel),
            allowed_statuses: self
                .allowed_statuses
                .clone()
                .unwrap_or(defaults.allowed_statuses),
        }
    }
}

impl Validate for OrdersConfig {
    fn validate(&self) -> Result<()> {
        validate_url("orders.endpoint", &self.endpoint)?;
        if let Some(timeout) = self.timeout_seconds {
            validate_range("orders.timeout_seconds", timeout, 1, MAX_TIMEOUT_SECONDS)?;
        }
        if let Some(timeout) = self.scan_timeout_seconds {
            validate_range("orders.scan_timeout_seconds", timeout, 1, MAX_TIMEOUT_SECONDS)?;
        }
        if let Some(size) = self.scan_page_size {
            validate_range("orders.scan_page_size", size, 1, 5000)?;
        }
        if let Some(pages) = self.scan_max_pages {
            validate_positive_number("orders.scan_max_pages", pages, 1)?;
        }
        if let Some(days) = self.scan_window_days {
            validate_range("orders.scan_window_days", days, 1, 365)?;
        }
        if let Some(statuses) = &self.allowed_statuses {
            if statuses.is_empty() {
                return Err(ReconcileError::InvalidConfigValueError {
                    field: "orders.allowed_statuses".to_string(),
                    value: "[]".to_string(),
                    reason: "At least one status must be allowed".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl SheetsConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_SHEETS_ENDPOINT)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECONDS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
                .min(MAX_TIMEOUT_SECONDS),
        )
    }
}

impl Validate for SheetsConfig {
    fn validate(&self) -> Result<()> {
        validate_url("sheets.endpoint", self.endpoint())?;
        if let Some(timeout) = self.timeout_seconds {
            validate_range("sheets.timeout_seconds", timeout, 1, MAX_TIMEOUT_SECONDS)?;
        }
        Ok(())
    }
}

impl TableSpec {
    pub fn first_column(&self) -> &str {
        self.first_column.as_deref().unwrap_or("A")
    }

    pub fn header_rows(&self) -> usize {
        self.header_rows.unwrap_or(1)
    }

    pub fn first_data_row(&self) -> usize {
        self.header_rows() + 1
    }

    pub fn key_match(&self) -> MatchMode {
        self.key_match.unwrap_or_default()
    }

    /// 整張表的範圍，例如 `'Returns'!A1:Q`
    pub fn full_range(&self) -> String {
        a1::open_range(&self.sheet, self.first_column(), 1, &self.last_column)
    }

    /// Offset of a sheet column inside a row read from `full_range`.
    pub fn offset_of(&self, column: &str) -> Result<usize> {
        let first = a1::column_index(self.first_column())?;
        let index = a1::column_index(column)?;
        let last = a1::column_index(&self.last_column)?;
        if index < first || index > last {
            return Err(ReconcileError::validation(format!(
                "Column {} is outside table range {}..{} of sheet '{}'",
                column,
                self.first_column(),
                self.last_column,
                self.sheet
            )));
        }
        Ok(index - first)
    }

    /// 依欄位名稱（不分大小寫）或欄位字母找出欄位字母
    pub fn column_for_field(&self, field: &str) -> Result<String> {
        let wanted = field.trim();
        if let Some(position) = self
            .columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(wanted))
        {
            let first = a1::column_index(self.first_column())?;
            return Ok(a1::column_letter(first + position));
        }

        // 直接給欄位字母也可以，但必須在表格範圍內
        if a1::column_index(wanted).is_ok() && wanted.len() <= 2 {
            self.offset_of(wanted)?;
            return Ok(wanted.to_ascii_uppercase());
        }

        Err(ReconcileError::validation(format!(
            "Unknown field '{}' for sheet '{}'",
            field, self.sheet
        )))
    }

    pub fn validate_as(&self, prefix: &str) -> Result<()> {
        validate_non_empty_string(&format!("{}.sheet", prefix), &self.sheet)?;
        validate_column_letter(&format!("{}.first_column", prefix), self.first_column())?;
        validate_column_letter(&format!("{}.last_column", prefix), &self.last_column)?;
        validate_column_letter(&format!("{}.key_column", prefix), &self.key_column)?;

        let first = a1::column_index(self.first_column())?;
        let last = a1::column_index(&self.last_column)?;
        if last < first {
            return Err(ReconcileError::InvalidConfigValueError {
                field: format!("{}.last_column", prefix),
                value: self.last_column.clone(),
                reason: "last_column must not precede first_column".to_string(),
            });
        }

        let mut referenced = vec![("key_column", self.key_column.as_str())];
        if let Some(column) = &self.timestamp_column {
            referenced.push(("timestamp_column", column.as_str()));
        }
        if let Some(column) = &self.status_column {
            referenced.push(("status_column", column.as_str()));
        }
        if let Some(filter) = &self.type_filter {
            referenced.push(("type_filter.column", filter.column.as_str()));
        }
        for (name, column) in referenced {
            validate_column_letter(&format!("{}.{}", prefix, name), column)?;
            self.offset_of(column)
                .map_err(|e| ReconcileError::InvalidConfigValueError {
                    field: format!("{}.{}", prefix, name),
                    value: column.to_string(),
                    reason: e.to_string(),
                })?;
        }

        if !self.columns.is_empty() {
            validate_unique_names(&format!("{}.columns", prefix), &self.columns)?;
            let width = last - first + 1;
            if self.columns.len() > width {
                return Err(ReconcileError::InvalidConfigValueError {
                    field: format!("{}.columns", prefix),
                    value: self.columns.len().to_string(),
                    reason: format!("Table range only spans {} columns", width),
                });
            }
        }
        Ok(())
    }
}
