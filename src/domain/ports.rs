use crate::domain::model::{OrderFilter, RemoteOrder};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// 外部訂單系統的搜尋介面
#[async_trait]
pub trait OrderSearch: Send + Sync {
    /// `timeout` of `None` means the client's default; overrides are capped by the client.
    async fn search(
        &self,
        action: &str,
        filter: &OrderFilter,
        timeout: Option<Duration>,
    ) -> Result<Vec<RemoteOrder>>;
}

/// Named-range access to the spreadsheet that backs the record tables.
///
/// Cells travel as display strings; the backend never enforces a schema.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Identity of the backing document, used as the cache-key prefix.
    fn identity(&self) -> &str;

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>>;

    async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<()>;

    /// Returns the range the backend reports as written, when it reports one.
    async fn append_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<Option<String>>;

    async fn clear_values(&self, range: &str) -> Result<()>;

    async fn sheet_row_count(&self, sheet: &str) -> Result<usize>;

    async fn set_sheet_row_count(&self, sheet: &str, rows: usize) -> Result<()>;
}
