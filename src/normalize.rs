//! Pure conversions from raw legacy cells to canonical values and keys.
//!
//! Nothing here touches a store; every function is deterministic except
//! [`normalize_field_key`] on input that has no usable characters at all.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use uuid::Uuid;

use crate::model::RawRow;

const ZERO_DATES: [&str; 2] = ["0000-00-00", "0000-00-00 00:00:00"];

/// Columns of a dynamic row that identify the row rather than carry form data.
const DYNAMIC_ID_COLUMNS: [&str; 2] = ["id", "task_id"];

const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Lower-case `raw` and squash every run of characters outside `[a-z0-9_]`
/// into a single underscore, trimming underscores from both ends.
///
/// Garbage input that leaves nothing behind gets a random `field_` key.
pub fn normalize_field_key(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut key = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        let ch = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '_'
        };
        if ch == '_' && key.ends_with('_') {
            continue;
        }
        key.push(ch);
    }

    let trimmed = key.trim_matches('_');
    if trimmed.is_empty() {
        let nonce = Uuid::new_v4().simple().to_string();
        return format!("field_{}", &nonce[..8]);
    }
    trimmed.to_string()
}

/// Map blank strings, `null` literals and zero-date sentinels to `Null`.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            if is_null_like(trimmed) {
                Value::Null
            } else if trimmed.len() == raw.len() {
                Value::String(raw)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        other => other,
    }
}

fn is_null_like(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") || ZERO_DATES.contains(&trimmed)
}

/// Normalized text content of a cell, or `None` when it is null-like.
pub fn normalize_text(value: Option<&Value>) -> Option<String> {
    match value.cloned().map(normalize_value)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Turn a dynamic-table row into form data keyed by normalized column names.
///
/// Identity columns are dropped. When two columns collapse onto the same key
/// the one whose raw name sorts first wins.
pub fn build_form_data(raw: &RawRow) -> BTreeMap<String, Value> {
    let mut data = BTreeMap::new();
    for (column, value) in raw {
        if DYNAMIC_ID_COLUMNS
            .iter()
            .any(|skip| column.eq_ignore_ascii_case(skip))
        {
            continue;
        }
        data.entry(normalize_field_key(column))
            .or_insert_with(|| normalize_value(value.clone()));
    }
    data
}

/// Legacy priorities are letter grades; `a` is the most urgent.
pub fn map_priority(raw: Option<&str>) -> i64 {
    let Some(first) = raw.and_then(|value| value.trim().chars().next()) else {
        return 0;
    };
    match first.to_ascii_lowercase() {
        'a' => 1,
        'b' => 2,
        'c' => 3,
        'd' => 4,
        _ => 0,
    }
}

/// URL-style slug: lower-case alphanumerics separated by single dashes.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for ch in raw.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn generate_application_number(type_slug_source: &str, legacy_task_id: i64) -> String {
    format!(
        "APP-{}-{}",
        slugify(type_slug_source).to_uppercase(),
        legacy_task_id
    )
}

/// Digit-only ids from a comma-separated list, deduplicated in first-seen order.
pub fn parse_csv_ids(csv: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    csv.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()))
        .filter(|token| seen.insert(*token))
        .map(str::to_string)
        .collect()
}

/// Free-form tags from a comma-separated list, deduplicated in first-seen order.
pub fn parse_csv_tags(csv: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    csv.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter(|token| seen.insert(*token))
        .map(str::to_string)
        .collect()
}

/// Resolve `base` against the names already taken, appending `_1`, `_2`, ...
/// until it is free. The winner is recorded in `used`.
pub fn resolve_unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 1;
    while used.contains(&candidate) {
        candidate = format!("{base}_{suffix}");
        suffix += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// `date_of_birth` -> `Date Of Birth`.
pub fn humanize_key(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best-effort date parsing; anything unrecognised degrades to `None`.
pub fn parse_legacy_datetime(value: Option<&Value>) -> Option<NaiveDateTime> {
    match value? {
        Value::Number(number) => number.as_i64().and_then(from_epoch),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if is_null_like(trimmed) {
                return None;
            }
            if trimmed.bytes().all(|b| b.is_ascii_digit()) {
                return trimmed.parse::<i64>().ok().and_then(from_epoch);
            }
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })
                .or_else(|| {
                    DateTime::parse_from_rfc3339(trimmed)
                        .ok()
                        .map(|parsed| parsed.naive_utc())
                })
        }
        _ => None,
    }
}

fn from_epoch(raw: i64) -> Option<NaiveDateTime> {
    if raw <= 0 {
        return None;
    }
    let parsed = if raw > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    };
    parsed.map(|dt| dt.naive_utc())
}

/// Storage form of a parsed legacy datetime.
pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}
