//! In-memory fakes of the ports, shared by the core unit tests.

use crate::config::toml_config::{TableSpec, TypeFilter};
use crate::domain::model::{OrderFilter, RemoteOrder};
use crate::domain::ports::{OrderSearch, SheetBackend};
use crate::utils::a1;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::normalize::MatchMode;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

pub fn returns_table() -> TableSpec {
    TableSpec {
        sheet: "Returns".to_string(),
        first_column: None,
        last_column: "H".to_string(),
        header_rows: Some(1),
        key_column: "D".to_string(),
        key_match: Some(MatchMode::DigitsOnly),
        timestamp_column: Some("A".to_string()),
        status_column: Some("G".to_string()),
        type_filter: Some(TypeFilter {
            column: "C".to_string(),
            value: "Return Product".to_string(),
        }),
        columns: row(&[
            "Timestamp", "Name", "Type", "Order", "Reason", "Notes", "Status", "Staff",
        ]),
    }
}

struct ParsedRange {
    sheet: String,
    first_col: usize,
    first_row: usize,
    last_col: usize,
    last_row: Option<usize>,
}

/// Parses the ranges this crate generates: `'Sheet'!A1:H`, `'Sheet'!D2:D`, `'Sheet'!G5`.
fn parse_range(range: &str) -> ParsedRange {
    let (sheet, cells) = range.rsplit_once('!').expect("range has a sheet");
    let sheet = sheet.trim_matches('\'').replace("''", "'");
    let (start, end) = cells.split_once(':').unwrap_or((cells, cells));

    let split = |part: &str| -> (usize, Option<usize>) {
        let letters: String = part.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        let digits: String = part.chars().filter(|c| c.is_ascii_digit()).collect();
        (a1::column_index(&letters).unwrap(), digits.parse().ok())
    };

    let (first_col, first_row) = split(start);
    let (last_col, last_row) = split(end);
    ParsedRange {
        sheet,
        first_col,
        first_row: first_row.unwrap_or(1),
        last_col,
        last_row,
    }
}

#[derive(Default)]
struct SheetState {
    grids: HashMap<String, Vec<Vec<String>>>,
    row_counts: HashMap<String, usize>,
    calls: Vec<String>,
    fail_updates: bool,
}

/// Grid-per-sheet fake that records every call as `"<op> <range>"`.
#[derive(Default)]
pub struct MemorySheet {
    state: Mutex<SheetState>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_grid(&self, sheet: &str, grid: Vec<Vec<String>>) {
        self.state
            .lock()
            .unwrap()
            .grids
            .insert(sheet.to_string(), grid);
    }

    pub fn set_row_count(&self, sheet: &str, rows: usize) {
        self.state
            .lock()
            .unwrap()
            .row_counts
            .insert(sheet.to_string(), rows);
    }

    pub fn fail_updates(&self) {
        self.state.lock().unwrap().fail_updates = true;
    }

    /// `row` is 1-based, `col` 0-based.
    pub fn cell(&self, sheet: &str, row: usize, col: usize) -> String {
        let state = self.state.lock().unwrap();
        state
            .grids
            .get(sheet)
            .and_then(|g| g.get(row - 1))
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }

    pub fn grid(&self, sheet: &str) -> Vec<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.grids.get(sheet).cloned().unwrap_or_default()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

#[async_trait]
impl SheetBackend for MemorySheet {
    fn identity(&self) -> &str {
        "memory-doc"
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {}", range));
        let r = parse_range(range);
        let grid = state.grids.get(&r.sheet).cloned().unwrap_or_default();

        let last_row = r.last_row.unwrap_or(grid.len()).min(grid.len());
        let mut out: Vec<Vec<String>> = Vec::new();
        for index in (r.first_row - 1)..last_row {
            let source = &grid[index];
            let mut cells: Vec<String> = (r.first_col..=r.last_col)
                .map(|c| source.get(c).cloned().unwrap_or_default())
                .collect();
            while cells.last().map(|c| c.is_empty()).unwrap_or(false) {
                cells.pop();
            }
            out.push(cells);
        }
        while out.last().map(|r| is_blank(r)).unwrap_or(false) {
            out.pop();
        }
        Ok(out)
    }

    async fn update_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update {}", range));
        if state.fail_updates {
            return Err(ReconcileError::transport("write failed"));
        }
        let r = parse_range(range);
        let grid = state.grids.entry(r.sheet).or_default();
        for (i, values) in rows.into_iter().enumerate() {
            let row_index = r.first_row - 1 + i;
            while grid.len() <= row_index {
                grid.push(Vec::new());
            }
            let target = &mut grid[row_index];
            for (j, value) in values.into_iter().enumerate() {
                let col = r.first_col + j;
                while target.len() <= col {
                    target.push(String::new());
                }
                target[col] = value;
            }
        }
        Ok(())
    }

    async fn append_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("append {}", range));
        let r = parse_range(range);
        let grid = state.grids.entry(r.sheet.clone()).or_default();
        while grid.last().map(|row| is_blank(row)).unwrap_or(false) {
            grid.pop();
        }
        let first = grid.len() + 1;
        let count = rows.len();
        grid.extend(rows);
        Ok(Some(format!("'{}'!A{}:A{}", r.sheet, first, first + count - 1)))
    }

    async fn clear_values(&self, range: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("clear {}", range));
        let r = parse_range(range);
        if let Some(grid) = state.grids.get_mut(&r.sheet) {
            let last_row = r.last_row.unwrap_or(grid.len()).min(grid.len());
            for index in (r.first_row - 1)..last_row {
                for col in r.first_col..=r.last_col {
                    if let Some(cell) = grid[index].get_mut(col) {
                        cell.clear();
                    }
                }
            }
        }
        Ok(())
    }

    async fn sheet_row_count(&self, sheet: &str) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("row-count {}", sheet));
        Ok(state.row_counts.get(sheet).copied().unwrap_or(1000))
    }

    async fn set_sheet_row_count(&self, sheet: &str, rows: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("set-rows {} {}", sheet, rows));
        state.row_counts.insert(sheet.to_string(), rows);
        Ok(())
    }
}

type Responder = dyn Fn(&OrderFilter) -> Result<Vec<RemoteOrder>> + Send + Sync;

/// Scripted order search that records every filter it receives.
pub struct FakeOrders {
    responder: Box<Responder>,
    calls: Mutex<Vec<(OrderFilter, Option<Duration>)>>,
}

impl FakeOrders {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OrderFilter) -> Result<Vec<RemoteOrder>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(OrderFilter, Option<Duration>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_with(&self, field: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| f.has(field))
            .count()
    }
}

#[async_trait]
impl OrderSearch for FakeOrders {
    async fn search(
        &self,
        _action: &str,
        filter: &OrderFilter,
        timeout: Option<Duration>,
    ) -> Result<Vec<RemoteOrder>> {
        self.calls.lock().unwrap().push((filter.clone(), timeout));
        (self.responder)(filter)
    }
}

/// `true` when the filter constrains `field` to exactly `value`.
pub fn filter_is(filter: &OrderFilter, field: &str, value: &str) -> bool {
    filter.get(field) == Some(&serde_json::json!([value]))
}
