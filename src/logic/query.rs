use itertools::Itertools;
use serde_json::{Map, Value};

use crate::model::{scalar_text, Pagination};

/// Build the list query string from pagination and filter values.
///
/// `null`, empty strings and empty arrays are dropped. Arrays become one repeated parameter
/// per element. Parameters follow the filter map's key order.
pub fn build_query_params(pagination: Option<&Pagination>, filter: &Map<String, Value>) -> String {
    let mut params: Vec<(String, String)> = Vec::new();

    if let Some(pagination) = pagination {
        params.push(("currentPage".to_string(), pagination.page.to_string()));
        params.push(("pageSize".to_string(), pagination.rows_per_page.to_string()));
        if let Some(sort_by) = pagination.sort_by.as_deref().filter(|s| !s.is_empty()) {
            params.push(("orderBy".to_string(), sort_by.to_string()));
        }
        let order = if pagination.descending { "desc" } else { "asc" };
        params.push(("sortOrder".to_string(), order.to_string()));
    }

    for (key, value) in filter {
        match value {
            Value::Null => {}
            Value::Array(values) => {
                for element in values {
                    if let Some(text) = param_text(element) {
                        params.push((key.clone(), text));
                    }
                }
            }
            scalar => {
                if let Some(text) = param_text(scalar) {
                    params.push((key.clone(), text));
                }
            }
        }
    }

    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .join("&")
}

fn param_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(scalar_text(other)),
    }
}
