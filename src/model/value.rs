use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A decoded field value.
///
/// Dates and booleans get a structured in-memory form; everything else stays JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(DateTime<FixedOffset>),
    Bool(bool),
    Json(Value),
}

impl FieldValue {
    /// JSON form of the value. Dates render as ISO-8601 UTC with milliseconds.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Date(date) => Value::String(iso_string(date)),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Json(value) => value.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Json(Value::Null) => true,
            FieldValue::Json(Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

pub fn iso_string(date: &DateTime<FixedOffset>) -> String {
    date.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A decoded item keyed by field name.
pub type Record = BTreeMap<String, FieldValue>;

/// Wrap every entry of a JSON object without any type-aware decoding.
pub fn record_from_json(map: &Map<String, Value>) -> Record {
    map.iter()
        .map(|(k, v)| (k.clone(), FieldValue::Json(v.clone())))
        .collect()
}

pub fn record_to_json(record: &Record) -> Map<String, Value> {
    record
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}
