use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::logic::deep_equal::field_values_equal;
use crate::model::{
    find_field, record_from_json, scalar_text, FieldDescriptor, FieldKind, FieldValue, Patch,
    RawItem, Record,
};

/// Key of the sub-object whose entries are treated as top-level fields when diffing.
pub const METADATA_KEY: &str = "metadata";

/// Decode a list of raw items.
pub fn decode(raw_items: &[RawItem], fields: &[FieldDescriptor], ignore_format: bool) -> Vec<Record> {
    raw_items
        .iter()
        .map(|raw| decode_item(raw, fields, ignore_format))
        .collect()
}

/// Decode one raw item according to the field descriptors.
///
/// A field with `children` for its decoded value pulls those sub-fields up to the top level.
/// Sub-field values are read from the nested object named after the discriminator value
/// (falling back to a top-level key of the same name) and the nested object is dropped.
pub fn decode_item(raw: &RawItem, fields: &[FieldDescriptor], ignore_format: bool) -> Record {
    if ignore_format {
        return record_from_json(raw);
    }

    let mut record = Record::new();
    let mut flattened: Vec<(String, FieldValue)> = Vec::new();
    let mut consumed: Vec<String> = Vec::new();

    for (key, value) in raw {
        let Some(field) = fields.iter().find(|f| &f.name == key) else {
            record.insert(key.clone(), FieldValue::Json(value.clone()));
            continue;
        };

        let decoded = decode_value(field.kind, value);
        let discriminator = scalar_text(&decoded.to_json());
        if let Some(children) = field.children_for(&discriminator) {
            let container = raw.get(&discriminator).and_then(Value::as_object);
            for child in children {
                let child_raw = container
                    .and_then(|c| c.get(&child.name))
                    .or_else(|| raw.get(&child.name));
                if let Some(child_raw) = child_raw {
                    flattened.push((child.name.clone(), decode_value(FieldKind::String, child_raw)));
                }
            }
            if container.is_some() {
                consumed.push(discriminator);
            }
        }
        record.insert(key.clone(), decoded);
    }

    for key in consumed {
        record.remove(&key);
    }
    record.extend(flattened);
    record
}

/// Decode a single wire value. Values that do not fit the kind are kept as JSON.
pub fn decode_value(kind: FieldKind, value: &Value) -> FieldValue {
    match (kind, value) {
        (FieldKind::String, Value::String(s)) => FieldValue::Text(s.clone()),
        (FieldKind::Date, Value::String(s)) => match parse_date(s) {
            Some(date) => FieldValue::Date(date),
            None => FieldValue::Json(value.clone()),
        },
        (FieldKind::Date, Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|date| FieldValue::Date(date.fixed_offset()))
            .unwrap_or_else(|| FieldValue::Json(value.clone())),
        (FieldKind::Boolean, Value::Bool(b)) => FieldValue::Bool(*b),
        (FieldKind::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => FieldValue::Bool(false),
            Some(1) => FieldValue::Bool(true),
            _ => FieldValue::Json(value.clone()),
        },
        (FieldKind::Boolean, Value::String(s)) => match s.as_str() {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::Json(value.clone()),
        },
        _ => FieldValue::Json(value.clone()),
    }
}

fn parse_date(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date);
    }
    // Offset-less timestamps are taken as UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Compute the patch between an edited record and its last-saved snapshot.
///
/// Unchanged fields and `ignore_patch` fields are left out; changed values are re-encoded
/// for the wire. Fields unknown to the descriptors pass through as JSON.
pub fn encode(edited: &Record, original: &Record, fields: &[FieldDescriptor]) -> Patch {
    let edited = flatten_metadata(edited);
    let original = flatten_metadata(original);
    let mut patch = Patch::new();

    for (key, value) in &edited {
        if original
            .get(key)
            .is_some_and(|before| field_values_equal(value, before))
        {
            continue;
        }
        match find_field(fields, key) {
            Some(field) if field.ignore_patch => {}
            Some(field) => {
                patch.insert(key.clone(), encode_value(field.kind, value));
            }
            None => {
                patch.insert(key.clone(), value.to_json());
            }
        }
    }

    patch
}

/// `encode` for plain JSON objects, e.g. serialized configuration objects.
pub fn encode_json(
    edited: &Map<String, Value>,
    original: &Map<String, Value>,
    fields: &[FieldDescriptor],
) -> Patch {
    encode(&record_from_json(edited), &record_from_json(original), fields)
}

pub fn encode_value(kind: FieldKind, value: &FieldValue) -> Value {
    match (kind, value) {
        (FieldKind::Boolean, FieldValue::Bool(b))
        | (FieldKind::Boolean, FieldValue::Json(Value::Bool(b))) => Value::String(b.to_string()),
        // Dates already serialize to ISO text
        _ => value.to_json(),
    }
}

fn flatten_metadata(record: &Record) -> Record {
    let Some(FieldValue::Json(Value::Object(metadata))) = record.get(METADATA_KEY) else {
        return record.clone();
    };
    let mut flat = record.clone();
    flat.remove(METADATA_KEY);
    for (key, value) in metadata {
        flat.insert(key.clone(), FieldValue::Json(value.clone()));
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw(value: Value) -> RawItem {
        value.as_object().cloned().unwrap()
    }

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::text("name"),
            FieldDescriptor::boolean("active").ignore_patch(),
            FieldDescriptor::boolean("public"),
            FieldDescriptor::date("created_at"),
            FieldDescriptor::text("source")
                .when(
                    "web",
                    vec![FieldDescriptor::text("url"), FieldDescriptor::text("depth")],
                )
                .when("sql", vec![FieldDescriptor::text("table")]),
        ]
    }

    #[test]
    fn test_decode_coerces_booleans() {
        let record = decode_item(
            &raw(json!({"public": 1, "active": "false", "name": "x"})),
            &fields(),
            false,
        );
        assert_eq!(record["public"], FieldValue::Bool(true));
        assert_eq!(record["active"], FieldValue::Bool(false));
        assert_eq!(record["name"], FieldValue::Text("x".to_string()));
    }

    #[test]
    fn test_decode_parses_dates() {
        let record = decode_item(
            &raw(json!({"created_at": "2024-05-06T07:08:09Z"})),
            &fields(),
            false,
        );
        match &record["created_at"] {
            FieldValue::Date(date) => assert_eq!(date.timestamp(), 1714979289),
            other => panic!("Expected date, got {:?}", other),
        }

        let naive = decode_item(&raw(json!({"created_at": "2024-05-06 07:08:09"})), &fields(), false);
        assert!(matches!(naive["created_at"], FieldValue::Date(_)));

        let garbage = decode_item(&raw(json!({"created_at": "yesterday"})), &fields(), false);
        assert_eq!(garbage["created_at"], FieldValue::Json(json!("yesterday")));
    }

    #[test]
    fn test_ignore_format_passes_through() {
        let record = decode_item(&raw(json!({"public": 1})), &fields(), true);
        assert_eq!(record["public"], FieldValue::Json(json!(1)));
    }

    #[test]
    fn test_decode_flattens_discriminated_children() {
        let record = decode_item(
            &raw(json!({
                "source": "web",
                "web": {"url": "https://example.com", "depth": 2},
                "sql": {"table": "docs"}
            })),
            &fields(),
            false,
        );

        assert_eq!(record["url"], FieldValue::Text("https://example.com".to_string()));
        assert_eq!(record["depth"], FieldValue::Json(json!(2)));
        assert!(!record.contains_key("web"));
        // Other union members are not touched
        assert!(record.contains_key("sql"));
        assert!(!record.contains_key("table"));
    }

    #[test]
    fn test_encode_identity_is_empty() {
        let record = decode_item(
            &raw(json!({
                "name": "a",
                "public": "true",
                "created_at": "2024-05-06T07:08:09.000Z",
                "metadata": {"owner": "ops"},
                "extra": [1, 2]
            })),
            &fields(),
            false,
        );
        assert!(encode(&record, &record, &fields()).is_empty());
    }

    #[test]
    fn test_encode_skips_ignored_fields() {
        let original = decode_item(&raw(json!({"name": "A", "active": true})), &fields(), false);
        let mut edited = original.clone();
        edited.insert("name".to_string(), FieldValue::from("B"));
        edited.insert("active".to_string(), FieldValue::Bool(false));

        let patch = encode(&edited, &original, &fields());
        assert_eq!(Value::Object(patch), json!({"name": "B"}));
    }

    #[test]
    fn test_encode_reencodes_for_wire() {
        let original = decode_item(
            &raw(json!({"public": false, "created_at": "2024-01-01T00:00:00Z"})),
            &fields(),
            false,
        );
        let mut edited = original.clone();
        edited.insert("public".to_string(), FieldValue::Bool(true));
        edited.insert(
            "created_at".to_string(),
            FieldValue::Date(DateTime::parse_from_rfc3339("2024-02-01T12:00:00+01:00").unwrap()),
        );
        edited.insert("unknown".to_string(), FieldValue::Json(json!({"k": 1})));

        let patch = encode(&edited, &original, &fields());
        assert_eq!(
            Value::Object(patch),
            json!({
                "public": "true",
                "created_at": "2024-02-01T11:00:00.000Z",
                "unknown": {"k": 1}
            })
        );
    }

    #[test]
    fn test_encode_flattens_metadata() {
        let original = record_from_json(&raw(json!({"name": "a", "metadata": {"owner": "ops", "tier": 1}})));
        let edited = record_from_json(&raw(json!({"name": "a", "metadata": {"owner": "dev", "tier": 1}})));

        let patch = encode(&edited, &original, &fields());
        assert_eq!(Value::Object(patch), json!({"owner": "dev"}));
    }

    #[test]
    fn test_encode_ignored_child_field() {
        let fields = vec![FieldDescriptor::text("kind")
            .when("sql", vec![FieldDescriptor::text("table").ignore_patch()])];
        let original = record_from_json(&raw(json!({"table": "a"})));
        let edited = record_from_json(&raw(json!({"table": "b"})));
        assert!(encode(&edited, &original, &fields).is_empty());
    }
}
