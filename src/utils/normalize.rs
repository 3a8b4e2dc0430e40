//! Identifier normalization shared by every comparison in the crate.
//!
//! Contract:
//! - [`clean_identifier`] trims surrounding whitespace and any trailing `/`
//!   (pasted URLs and scanner input often carry one).
//! - [`trim_lower`] is the canonical form for case-insensitive equality.
//! - [`digits_only`] keeps ASCII digits and drops leading zeros, so `"000123"`
//!   and `"#123"` both become `"123"`.
//! - [`compact`] removes whitespace and hyphens and lowercases, so
//!   `"22-12345-67890"` and `"2212345 67890"` compare equal.
//!
//! No other module should roll its own variant of these rules.

use serde::{Deserialize, Serialize};

/// 比對 key 欄位時使用的模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    #[default]
    ExactTrimmed,
    DigitsOnly,
}

impl MatchMode {
    /// `stored` 是表格中的值，`wanted` 是呼叫端傳入的值
    pub fn matches(self, stored: &str, wanted: &str) -> bool {
        match self {
            MatchMode::ExactTrimmed => {
                let wanted = wanted.trim();
                !wanted.is_empty() && stored.trim() == wanted
            }
            MatchMode::DigitsOnly => {
                let wanted = digits_only(wanted);
                !wanted.is_empty() && digits_only(stored) == wanted
            }
        }
    }

    /// Key used by the mutation gate, so `"0123"` and `"123"` serialize together
    /// under digits-only matching.
    pub fn gate_key(self, value: &str) -> String {
        match self {
            MatchMode::ExactTrimmed => value.trim().to_string(),
            MatchMode::DigitsOnly => digits_only(value),
        }
    }
}

pub fn clean_identifier(raw: &str) -> String {
    raw.trim().trim_end_matches('/').trim_end().to_string()
}

pub fn trim_lower(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn digits_only(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() && !digits.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

pub fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// 比對外部參考號：完全相符（去空白）或 compact 形式相符
pub fn reference_matches(candidate: &str, target: &str) -> bool {
    let candidate = candidate.trim();
    let target = target.trim();
    if candidate.is_empty() || target.is_empty() {
        return false;
    }
    if candidate == target {
        return true;
    }
    let compact_target = compact(target);
    !compact_target.is_empty() && compact(candidate) == compact_target
}

pub fn eq_ignore_case_trimmed(a: &str, b: &str) -> bool {
    trim_lower(a) == trim_lower(b)
}
