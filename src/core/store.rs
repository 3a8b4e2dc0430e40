use crate::config::toml_config::TableSpec;
use crate::core::cache::TtlCache;
use crate::core::key_gate::KeyGate;
use crate::domain::model::{CapacityReport, TableSnapshot};
use crate::domain::ports::SheetBackend;
use crate::utils::a1;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::normalize::MatchMode;
use crate::utils::timestamp::parse_sheet_timestamp;
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Row-addressed access to the spreadsheet tables.
///
/// Bulk reads go through the TTL cache. Key scans, mutations and resorts always
/// talk to the backend directly, and writes never refresh or evict the cache.
pub struct RecordStore<B: SheetBackend> {
    backend: B,
    cache: TtlCache<Arc<TableSnapshot>>,
    ttl: Duration,
    gate: KeyGate,
}

impl<B: SheetBackend> RecordStore<B> {
    pub fn new(backend: B, ttl: Duration) -> Self {
        Self::with_cache(backend, ttl, TtlCache::new())
    }

    /// 注入共用的快取（多個 store 共用同一份 process-wide 快取時使用）
    pub fn with_cache(backend: B, ttl: Duration, cache: TtlCache<Arc<TableSnapshot>>) -> Self {
        Self {
            backend,
            cache,
            ttl,
            gate: KeyGate::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache_key(&self, table: &TableSpec) -> String {
        format!("{}!{}", self.backend.identity(), table.full_range())
    }

    /// 快取的整表讀取；TTL 內重複呼叫會回傳同一份快照
    pub async fn read_table(&self, table: &TableSpec) -> Result<Arc<TableSnapshot>> {
        let key = self.cache_key(table);
        let range = table.full_range();
        self.cache
            .get(&key, self.ttl, || async {
                let grid = self.backend.get_values(&range).await?;
                tracing::debug!("📥 Loaded {} rows from {}", grid.len(), range);
                Ok(Arc::new(TableSnapshot::from_grid(grid, 1)))
            })
            .await
    }

    pub async fn invalidate(&self, table: &TableSpec) {
        self.cache.invalidate(&self.cache_key(table)).await;
    }

    /// Live scan of one column. Returns the absolute row number of the first
    /// data row whose cell matches `key_value`.
    ///
    /// Not synchronized with writers; pair it with [`Self::update_cell`] only
    /// through [`Self::update_by_key`] unless the caller serializes itself.
    pub async fn find_row_by_key(
        &self,
        table: &TableSpec,
        key_column: &str,
        key_value: &str,
        mode: MatchMode,
    ) -> Result<Option<usize>> {
        table.offset_of(key_column)?;
        let first_row = table.first_data_row();
        let range = a1::open_range(&table.sheet, key_column, first_row, key_column);
        let column = self.backend.get_values(&range).await?;
        Ok(find_key_row(&column, first_row, key_value, mode))
    }

    pub async fn update_cell(
        &self,
        table: &TableSpec,
        row_number: usize,
        column: &str,
        value: &str,
    ) -> Result<()> {
        table.offset_of(column)?;
        if row_number < table.first_data_row() {
            return Err(ReconcileError::validation(format!(
                "Row {} is part of the header of '{}'",
                row_number, table.sheet
            )));
        }

        let range = a1::cell(&table.sheet, column, row_number);
        self.backend
            .update_values(&range, vec![vec![value.to_string()]])
            .await
    }

    /// 依 key 找列並更新單一儲存格，整個過程持有 (table, key) 的鎖
    pub async fn update_by_key(
        &self,
        table: &TableSpec,
        key_value: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<usize>> {
        let mode = table.key_match();
        let _guard = self
            .gate
            .lock_key(&table.sheet, &mode.gate_key(key_value))
            .await;

        let Some(row_number) = self
            .find_row_by_key(table, &table.key_column, key_value, mode)
            .await?
        else {
            tracing::info!("🔍 No row in '{}' matches key '{}'", table.sheet, key_value);
            return Ok(None);
        };

        self.update_cell(table, row_number, column, value).await?;
        tracing::info!(
            "✏️ Updated '{}'!{}{} for key '{}'",
            table.sheet,
            column,
            row_number,
            key_value
        );
        Ok(Some(row_number))
    }

    /// Appends one row. Duplicate business keys are allowed; every physical
    /// submission gets its own row.
    pub async fn append_row(&self, table: &TableSpec, row: Vec<String>) -> Result<Option<String>> {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            return Err(ReconcileError::validation("Refusing to append an empty row"));
        }
        let width = table.offset_of(&table.last_column)? + 1;
        if row.len() > width {
            return Err(ReconcileError::validation(format!(
                "Row has {} cells but '{}' only spans {} columns",
                row.len(),
                table.sheet,
                width
            )));
        }

        let _shared = self.gate.lock_table_shared(&table.sheet).await;
        let updated = self
            .backend
            .append_values(&table.full_range(), vec![row])
            .await?;
        tracing::info!("➕ Appended a row to '{}'", table.sheet);
        Ok(updated)
    }

    /// Re-sorts the table chronologically. Returns the number of data rows written.
    pub async fn resort_table(&self, table: &TableSpec) -> Result<usize> {
        let timestamp_column = table.timestamp_column.as_deref().ok_or_else(|| {
            ReconcileError::validation(format!(
                "Table '{}' has no timestamp_column and cannot be re-sorted",
                table.sheet
            ))
        })?;
        let timestamp_offset = table.offset_of(timestamp_column)?;
        let range = table.full_range();

        let _exclusive = self.gate.lock_table_exclusive(&table.sheet).await;
        let grid = self.backend.get_values(&range).await?;
        let plan = ResortPlan::build(grid, table.header_rows(), timestamp_offset);
        tracing::info!(
            "🗂️ Re-sorting '{}' ({} rows, {} without a readable timestamp)",
            table.sheet,
            plan.rows_sorted(),
            plan.unparsable
        );
        plan.apply(&self.backend, &range).await
    }

    pub async fn capacity_report(&self, table: &TableSpec) -> Result<CapacityReport> {
        let range = a1::open_range(&table.sheet, &table.key_column, 1, &table.key_column);
        let column = self.backend.get_values(&range).await?;
        let used_rows = last_non_blank_row(&column);
        let total_rows = self.backend.sheet_row_count(&table.sheet).await?;
        Ok(CapacityReport::new(used_rows, total_rows))
    }

    /// 增加工作表的列數上限（只改 metadata，不動資料）
    pub async fn expand_capacity(
        &self,
        table: &TableSpec,
        additional_rows: usize,
    ) -> Result<CapacityReport> {
        if additional_rows > 0 {
            let current = self.backend.sheet_row_count(&table.sheet).await?;
            let target = current.checked_add(additional_rows).ok_or_else(|| {
                ReconcileError::validation(format!("Cannot add {} rows", additional_rows))
            })?;
            self.backend
                .set_sheet_row_count(&table.sheet, target)
                .await?;
            tracing::info!(
                "📏 Expanded '{}' from {} to {} rows",
                table.sheet,
                current,
                target
            );
        }
        self.capacity_report(table).await
    }
}

/// 由上而下找第一筆符合的列（重複 key 時取最早的一列）
pub fn find_key_row(
    column: &[Vec<String>],
    first_row: usize,
    key_value: &str,
    mode: MatchMode,
) -> Option<usize> {
    column
        .iter()
        .position(|row| {
            row.first()
                .map(|cell| mode.matches(cell, key_value))
                .unwrap_or(false)
        })
        .map(|index| first_row + index)
}

/// Backward scan for the last non-blank cell of a column read from row 1.
pub fn last_non_blank_row(column: &[Vec<String>]) -> usize {
    column
        .iter()
        .rposition(|row| row.first().map(|c| !c.trim().is_empty()).unwrap_or(false))
        .map(|index| index + 1)
        .unwrap_or(0)
}

/// Phase one of a resort: the sorted image of the table, built from a live read.
///
/// Phase two ([`ResortPlan::apply`]) clears the range and writes the image back
/// in one batch. The backend offers no transaction across the two calls: a crash
/// or failed write after the clear leaves the table empty until someone re-runs
/// the resort from a backup. On a transactional store both phases belong in
/// one atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResortPlan {
    pub header: Vec<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub unparsable: usize,
}

impl ResortPlan {
    /// Fully blank data rows are dropped; unparsable timestamps sort last.
    pub fn build(grid: Vec<Vec<String>>, header_rows: usize, timestamp_offset: usize) -> Self {
        let mut grid = grid.into_iter();
        let header: Vec<Vec<String>> = grid.by_ref().take(header_rows).collect();

        let mut keyed: Vec<(Option<NaiveDateTime>, Vec<String>)> = grid
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|row| {
                let stamp = row
                    .get(timestamp_offset)
                    .and_then(|cell| parse_sheet_timestamp(cell));
                (stamp, row)
            })
            .collect();

        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        let unparsable = keyed.iter().filter(|(stamp, _)| stamp.is_none()).count();
        Self {
            header,
            rows: keyed.into_iter().map(|(_, row)| row).collect(),
            unparsable,
        }
    }

    pub fn rows_sorted(&self) -> usize {
        self.rows.len()
    }

    pub async fn apply<B: SheetBackend + ?Sized>(self, backend: &B, range: &str) -> Result<usize> {
        let rows_sorted = self.rows_sorted();
        let mut image = self.header;
        image.extend(self.rows);

        backend.clear_values(range).await?;
        if let Err(e) = backend.update_values(range, image).await {
            tracing::error!(
                "❌ {} was cleared but rewriting {} rows failed: {}",
                range,
                rows_sorted,
                e
            );
            return Err(e);
        }
        Ok(rows_sorted)
    }
}
