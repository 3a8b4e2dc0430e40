//! A1-notation helpers for addressing sheet ranges.

use crate::utils::error::{ReconcileError, Result};

/// 試算表最多到 XFD 欄，三個字母
const MAX_COLUMN_LETTERS: usize = 3;

/// 欄位字母轉成 0-based 索引（A => 0, Z => 25, AA => 26）
pub fn column_index(letters: &str) -> Result<usize> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ReconcileError::validation(format!(
            "'{}' is not a column letter",
            letters
        )));
    }

    if letters.len() > MAX_COLUMN_LETTERS {
        return Err(ReconcileError::validation(format!(
            "'{}' is beyond the last sheet column",
            letters
        )));
    }

    let mut index = 0usize;
    for c in letters.chars() {
        let value = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index * 26 + value;
    }
    Ok(index - 1)
}

pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// 以單引號包住工作表名稱，避免空白或特殊字元
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

pub fn cell(sheet: &str, column: &str, row: usize) -> String {
    format!("{}!{}{}", quote_sheet(sheet), column.to_ascii_uppercase(), row)
}

/// Open-ended range, e.g. `'Returns'!A2:Q`.
pub fn open_range(sheet: &str, first_column: &str, first_row: usize, last_column: &str) -> String {
    format!(
        "{}!{}{}:{}",
        quote_sheet(sheet),
        first_column.to_ascii_uppercase(),
        first_row,
        last_column.to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_index_round_trip_edges() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("d").unwrap(), 3);
        assert_eq!(column_index("Z").unwrap(), 25);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(3), "D");
        assert!(column_index("4").is_err());
        assert!(column_index("").is_err());
    }

    #[test]
    fn test_column_index_rejects_overlong_letters() {
        assert_eq!(column_index("ZZZ").unwrap(), 18277);
        let err = column_index("ZZZZZZZZZZZZZZZ").unwrap_err();
        assert!(matches!(err, ReconcileError::ValidationError { .. }));
    }

    #[test]
    fn test_ranges_quote_sheet_names() {
        assert_eq!(cell("Parts Log", "d", 7), "'Parts Log'!D7");
        assert_eq!(open_range("Returns", "A", 1, "q"), "'Returns'!A1:Q");
        assert_eq!(quote_sheet("Bob's"), "'Bob''s'");
    }
}
