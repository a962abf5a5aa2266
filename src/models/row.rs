use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==================== RAW ROW ====================

/// A single cell as delivered by the input collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// Column name to raw value, as loaded from CSV or received over HTTP.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub BTreeMap<String, RawValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<RawValue>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: RawValue) {
        self.0.insert(column.into(), value);
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, RawValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, RawValue)>>(iter: I) -> Self {
        Row(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ==================== NORMALIZED ROW ====================

/// A coerced number together with the cell text it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Numeric {
    pub value: Decimal,
    pub source: String,
}

impl Numeric {
    pub fn new(value: Decimal, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
        }
    }
}

impl Serialize for Numeric {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.value, serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Decimal(Numeric),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(number) => Some(number.value),
            _ => None,
        }
    }

    /// Text form of any non-null value. Numeric cells render as they were
    /// written, so identifiers like `007` survive.
    pub fn render(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Decimal(number) => Some(number.source.clone()),
            FieldValue::Text(text) => Some(text.clone()),
        }
    }
}

/// Lower-cased, trimmed column names mapped to typed values. Null cells keep
/// their key so the header set survives normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRow(BTreeMap<String, FieldValue>);

impl NormalizedRow {
    pub fn from_fields(fields: BTreeMap<String, FieldValue>) -> Self {
        Self(fields)
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.0.get(column)
    }

    /// Non-null value for a column looked up by its canonical (lower-case) name.
    pub fn value(&self, column: &str) -> Option<&FieldValue> {
        self.0
            .get(&column.trim().to_lowercase())
            .filter(|value| !value.is_null())
    }

    /// First non-null value among the aliases, in alias order.
    pub fn first_of<'a>(&'a self, aliases: &[&'a str]) -> Option<(&'a str, &'a FieldValue)> {
        aliases
            .iter()
            .find_map(|alias| self.value(alias).map(|value| (*alias, value)))
    }

    pub fn has_any(&self, aliases: &[&str]) -> bool {
        self.first_of(aliases).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}
