use serde_json::{Map, Value};
use uuid::Uuid;

pub type Id = String;

/// An item exactly as the remote service sends it, before decoding.
pub type RawItem = Map<String, Value>;

/// Outgoing partial update: only changed, patch-eligible fields in wire form.
pub type Patch = Map<String, Value>;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Render a scalar JSON value the way it appears in a query string or filter text.
/// Strings are returned without quotes; structured values fall back to their JSON text.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
