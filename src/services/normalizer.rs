use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::constants::{CURRENCY_MARKERS, NULL_TOKENS};
use crate::models::{FieldValue, NormalizedRow, Numeric, RawValue, Row};

/// Canonicalize a raw row. Keys are trimmed and lower-cased, values keep
/// their case. Never fails: anything that does not coerce stays text.
pub fn normalize_row(row: &Row) -> NormalizedRow {
    let mut fields = BTreeMap::new();
    for (column, raw) in row.iter() {
        let key = column.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        let value = normalize_value(raw);
        // Duplicate keys after lower-casing: keep the first non-null value.
        match fields.get(&key) {
            Some(existing) if !FieldValue::is_null(existing) => {}
            _ => {
                fields.insert(key, value);
            }
        }
    }
    NormalizedRow::from_fields(fields)
}

pub fn normalize_value(raw: &RawValue) -> FieldValue {
    match raw {
        RawValue::Null => FieldValue::Null,
        RawValue::Bool(flag) => FieldValue::Text(flag.to_string()),
        RawValue::Number(number) => {
            if !number.is_finite() {
                return FieldValue::Null;
            }
            let source = number.to_string();
            match Decimal::from_str(&source) {
                Ok(value) => FieldValue::Decimal(Numeric::new(value, source)),
                Err(_) => FieldValue::Text(source),
            }
        }
        RawValue::Text(text) => normalize_text(text),
    }
}

pub fn normalize_text(text: &str) -> FieldValue {
    let trimmed = text.trim();
    if is_null_token(trimmed) {
        return FieldValue::Null;
    }
    match coerce_decimal(trimmed) {
        Some(value) => FieldValue::Decimal(Numeric::new(value, trimmed)),
        None => FieldValue::Text(trimmed.to_string()),
    }
}

fn is_null_token(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    NULL_TOKENS.iter().any(|token| *token == lowered)
}

/// Numeric-looking strings, optionally wrapped in one currency marker and
/// using comma thousands grouping: `$1,250.50`, `95.00 USD`, `0.5 ETH`.
pub fn coerce_decimal(value: &str) -> Option<Decimal> {
    let stripped = strip_currency_marker(value.trim());
    let (negative, digits) = match stripped.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, stripped),
    };
    if digits.is_empty() {
        return None;
    }
    let plain = strip_thousands_separators(digits)?;
    if !plain
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.')
        || !plain.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }
    let parsed = Decimal::from_str(&plain).ok()?;
    Some(if negative { -parsed } else { parsed })
}

fn strip_currency_marker(value: &str) -> &str {
    for marker in CURRENCY_MARKERS {
        if value.len() < marker.len() {
            continue;
        }
        let head = marker.len();
        if value.is_char_boundary(head) && value[..head].eq_ignore_ascii_case(marker) {
            return value[head..].trim_start();
        }
        let tail = value.len() - marker.len();
        if value.is_char_boundary(tail) && value[tail..].eq_ignore_ascii_case(marker) {
            return value[..tail].trim_end();
        }
    }
    value
}

// Commas are accepted only as thousands separators in the integer part.
fn strip_thousands_separators(value: &str) -> Option<String> {
    if !value.contains(',') {
        return Some(value.to_string());
    }
    let (integer, fraction) = match value.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (value, None),
    };
    let groups: Vec<&str> = integer.split(',').collect();
    let well_formed = groups.first().is_some_and(|g| (1..=3).contains(&g.len()))
        && groups.iter().skip(1).all(|g| g.len() == 3);
    if !well_formed {
        return None;
    }
    let mut plain = groups.concat();
    if let Some(fraction) = fraction {
        plain.push('.');
        plain.push_str(fraction);
    }
    Some(plain)
}
