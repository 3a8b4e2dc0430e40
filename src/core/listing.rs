use crate::config::toml_config::TableSpec;
use crate::domain::model::{ListPage, ListQuery, ListedRecord, TableRow, TableSnapshot};
use crate::utils::a1;
use crate::utils::error::Result;
use crate::utils::normalize::eq_ignore_case_trimmed;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const MIN_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 200;

pub fn clamp_page_size(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

struct Projected<'a> {
    row: &'a TableRow,
    status: String,
}

/// Filters, orders and paginates a table snapshot.
///
/// Rows are returned newest first (the sheet appends at the bottom).
/// `distinct_statuses` is taken after the type filter but before the
/// status and text filters.
pub fn list_records(snapshot: &TableSnapshot, table: &TableSpec, query: &ListQuery) -> Result<ListPage> {
    let type_filter = match &table.type_filter {
        Some(filter) => Some((table.offset_of(&filter.column)?, filter.value.as_str())),
        None => None,
    };
    let status_offset = match &table.status_column {
        Some(column) => Some(table.offset_of(column)?),
        None => None,
    };

    let typed: Vec<Projected> = snapshot
        .data_rows(table.header_rows())
        .iter()
        .filter(|row| !row.cells.iter().all(|c| c.trim().is_empty()))
        .filter(|row| match type_filter {
            Some((offset, wanted)) => eq_ignore_case_trimmed(row.cell(offset), wanted),
            None => true,
        })
        .map(|row| Projected {
            row,
            status: status_offset
                .map(|offset| row.cell(offset).trim().to_string())
                .unwrap_or_default(),
        })
        .collect();

    let distinct_statuses: Vec<String> = typed
        .iter()
        .filter(|p| !p.status.is_empty())
        .map(|p| p.status.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let needle = query
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    let mut matched: Vec<&Projected> = typed
        .iter()
        .filter(|p| status.map_or(true, |s| eq_ignore_case_trimmed(&p.status, s)))
        .filter(|p| match &needle {
            Some(needle) => p.row.cells.join(" ").to_lowercase().contains(needle.as_str()),
            None => true,
        })
        .collect();
    matched.reverse();

    let page_size = clamp_page_size(query.page_size);
    let total = matched.len();
    let total_pages = total.div_ceil(page_size).max(1);
    let page = query.page.unwrap_or(1).clamp(1, total_pages);

    let items = matched
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|p| to_record(p.row, table))
        .collect();

    Ok(ListPage {
        items,
        total,
        page,
        page_size,
        total_pages,
        distinct_statuses,
    })
}

/// 依欄位名稱（沒有名稱時用欄位字母）轉成 JSON 物件
fn to_record(row: &TableRow, table: &TableSpec) -> ListedRecord {
    let first = a1::column_index(table.first_column()).unwrap_or(0);
    let mut fields = Map::new();
    for (i, value) in row.cells.iter().enumerate() {
        let name = table
            .columns
            .get(i)
            .cloned()
            .unwrap_or_else(|| a1::column_letter(first + i));
        fields.insert(name, Value::String(value.clone()));
    }
    for name in table.columns.iter().skip(row.cells.len()) {
        fields.insert(name.clone(), Value::String(String::new()));
    }
    ListedRecord {
        row_number: row.row_number,
        fields,
    }
}
