use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Remote order system
// ---------------------------------------------------------------------------

/// 外部訂單系統回傳的訂單（唯讀）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteOrder {
    #[serde(rename(deserialize = "OrderID"), default, deserialize_with = "lenient_string")]
    pub order_id: String,
    #[serde(
        rename(deserialize = "PurchaseOrderNumber"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub purchase_order_number: Option<String>,
    #[serde(
        rename(deserialize = "SalesChannel"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub sales_channel: Option<String>,
    #[serde(
        rename(deserialize = "OrderStatus"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub order_status: Option<String>,
    #[serde(
        rename(deserialize = "DatePlaced"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub date_placed: Option<String>,
    #[serde(
        rename(deserialize = "BillFirstName"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub bill_first_name: Option<String>,
    #[serde(
        rename(deserialize = "BillLastName"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub bill_last_name: Option<String>,
    #[serde(
        rename(deserialize = "Username"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub username: Option<String>,
    #[serde(
        rename(deserialize = "Email"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub email: Option<String>,
    #[serde(
        rename(deserialize = "OrderLine"),
        default,
        deserialize_with = "one_or_many"
    )]
    pub lines: Vec<OrderLine>,
}

impl RemoteOrder {
    pub fn is_on_channel(&self, channel: &str) -> bool {
        self.sales_channel
            .as_deref()
            .map(|c| crate::utils::normalize::eq_ignore_case_trimmed(c, channel))
            .unwrap_or(false)
    }

    pub fn status_is_one_of(&self, allowed: &[String]) -> bool {
        let Some(status) = self.order_status.as_deref() else {
            return false;
        };
        allowed
            .iter()
            .any(|a| crate::utils::normalize::eq_ignore_case_trimmed(a, status))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    #[serde(rename(deserialize = "SKU"), default, deserialize_with = "lenient_opt_string")]
    pub sku: Option<String>,
    #[serde(
        rename(deserialize = "ProductName"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub product_name: Option<String>,
    #[serde(
        rename(deserialize = "Quantity"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub quantity: Option<String>,
    #[serde(
        rename(deserialize = "ExternalSystemIdentifier"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub external_system_identifier: Option<String>,
    #[serde(
        rename(deserialize = "ExternalOrderReference"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub external_order_reference: Option<String>,
    #[serde(
        rename(deserialize = "ExternalOrderLineReference"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub external_order_line_reference: Option<String>,
    #[serde(rename(deserialize = "eBay"), default)]
    pub marketplace: Option<MarketplaceDetails>,
}

impl OrderLine {
    /// 所有可用來比對外部參考號的欄位
    pub fn reference_values(&self) -> impl Iterator<Item = &str> {
        let marketplace = self.marketplace.as_ref();
        [
            self.external_system_identifier.as_deref(),
            self.external_order_reference.as_deref(),
            self.external_order_line_reference.as_deref(),
            marketplace.and_then(|m| m.transaction_id.as_deref()),
            marketplace.and_then(|m| m.auction_id.as_deref()),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketplaceDetails {
    #[serde(
        rename(deserialize = "eBayTransactionID"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub transaction_id: Option<String>,
    #[serde(
        rename(deserialize = "eBayAuctionID"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub auction_id: Option<String>,
    #[serde(
        rename(deserialize = "eBayUsername"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub username: Option<String>,
    #[serde(
        rename(deserialize = "eBayStoreName"),
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub store_name: Option<String>,
}

/// Filter payload for the order search endpoint.
///
/// Field constraints are list-wrapped the way the remote API expects
/// (`{"OrderID": ["N123"]}`); scalar settings such as `DatePlacedFrom` are not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    fields: Map<String, Value>,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(field.to_string(), Value::Array(vec![Value::String(value.into())]));
        self
    }

    pub fn with_scalar(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn output(mut self, selectors: &[&str]) -> Self {
        let list = selectors.iter().map(|s| Value::String(s.to_string())).collect();
        self.fields.insert("OutputSelector".to_string(), Value::Array(list));
        self
    }

    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.fields.insert("Page".to_string(), Value::from(page));
        self.fields.insert("Limit".to_string(), Value::from(limit));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn to_body(&self) -> Value {
        serde_json::json!({ "Filter": Value::Object(self.fields.clone()) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    PurchaseOrderNumber,
    OrderId,
    ReferenceScan,
    UnfilteredReferenceScan,
    CustomerName,
    ChannelUsername,
    MarketplaceUsername,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionCandidate {
    pub order: RemoteOrder,
    pub strategy: MatchStrategy,
}

/// 解析成功的結果：訂單本體與其明細分開回傳
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub order: RemoteOrder,
    pub items: Vec<OrderLine>,
    pub strategy: MatchStrategy,
}

impl From<ResolutionCandidate> for Resolution {
    fn from(candidate: ResolutionCandidate) -> Self {
        let mut order = candidate.order;
        let items = std::mem::take(&mut order.lines);
        Self {
            order,
            items,
            strategy: candidate.strategy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerQuery {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl CustomerQuery {
    /// Parses `"Last, First"`. Returns `None` when either side is blank.
    pub fn from_last_first(raw: &str) -> Option<Self> {
        let (last, first) = raw.split_once(',')?;
        let (last, first) = (last.trim(), first.trim());
        if last.is_empty() || first.is_empty() {
            return None;
        }
        Some(Self {
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            username: None,
        })
    }

    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").is_empty();
        blank(&self.first_name) && blank(&self.last_name) && blank(&self.username)
    }
}

// ---------------------------------------------------------------------------
// Tabular store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    /// Absolute 1-based sheet row.
    pub row_number: usize,
    pub cells: Vec<String>,
}

impl TableRow {
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub rows: Vec<TableRow>,
    pub fetched_at: DateTime<Utc>,
}

impl TableSnapshot {
    pub fn from_grid(grid: Vec<Vec<String>>, first_row: usize) -> Self {
        let rows = grid
            .into_iter()
            .enumerate()
            .map(|(i, cells)| TableRow {
                row_number: first_row + i,
                cells,
            })
            .collect();
        Self {
            rows,
            fetched_at: Utc::now(),
        }
    }

    /// 略過表頭後的資料列
    pub fn data_rows(&self, header_rows: usize) -> &[TableRow] {
        let skip = header_rows.min(self.rows.len());
        &self.rows[skip..]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityReport {
    pub used_rows: usize,
    pub total_rows: usize,
    pub available_rows: usize,
    pub available_pct: f64,
}

impl CapacityReport {
    pub fn new(used_rows: usize, total_rows: usize) -> Self {
        let available_rows = total_rows.saturating_sub(used_rows);
        let available_pct = if total_rows == 0 {
            0.0
        } else {
            ((available_rows as f64 / total_rows as f64) * 1000.0).round() / 10.0
        };
        Self {
            used_rows,
            total_rows,
            available_rows,
            available_pct,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedRecord {
    pub row_number: usize,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPage {
    pub items: Vec<ListedRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub distinct_statuses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub success: bool,
    pub row_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub success: bool,
    pub updated_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResortOutcome {
    pub rows_sorted: usize,
}

// ---------------------------------------------------------------------------
// Lenient wire decoding
// ---------------------------------------------------------------------------

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
            .collect(),
        single => serde_json::from_value(single)
            .map(|item| vec![item])
            .map_err(serde::de::Error::custom),
    }
}

/// Accepts a single object or an array under the same key.
pub fn orders_from_value(value: Value) -> serde_json::Result<Vec<RemoteOrder>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.into_iter().map(serde_json::from_value).collect(),
        single => Ok(vec![serde_json::from_value(single)?]),
    }
}
