use serde_json::Value;

use crate::model::{FieldValue, Record};

/// Structural equality of two JSON values, independent of key order.
///
/// Numbers compare by numeric value, so `1` and `1.0` are equal the way they are after a
/// JSON round-trip. `null` and a missing key are different things.
pub fn deep_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(key, lv)| r.get(key).is_some_and(|rv| deep_equal(lv, rv)))
        }
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(lv, rv)| deep_equal(lv, rv))
        }
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(lf), Some(rf)) => lf == rf,
            _ => l == r,
        },
        _ => left == right,
    }
}

/// Equality of decoded values through their JSON form.
pub fn field_values_equal(left: &FieldValue, right: &FieldValue) -> bool {
    deep_equal(&left.to_json(), &right.to_json())
}

pub fn records_equal(left: &Record, right: &Record) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(key, lv)| right.get(key).is_some_and(|rv| field_values_equal(lv, rv)))
}
