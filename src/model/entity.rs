use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{scalar_text, FieldDescriptor, RawItem, Record};

/// Field identifying an entity's records, and the route parameter that carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyField {
    pub field: String,
    pub url_key: String,
}

impl KeyField {
    pub fn new(field: &str, url_key: &str) -> Self {
        Self {
            field: field.to_string(),
            url_key: url_key.to_string(),
        }
    }
}

/// Operations the remote service offers for an entity beyond plain list reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub paginated: bool,
    pub detail: bool,
    pub refresh: bool,
    /// Read-only sub-collections reject create/update/delete.
    pub read_only: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            paginated: true,
            detail: true,
            refresh: false,
            read_only: false,
        }
    }
}

/// Static description of a remote collection. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub service: String,
    pub endpoint: String,
    pub fields: Vec<FieldDescriptor>,
    pub key_field: KeyField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl EntityDescriptor {
    pub fn new(name: &str, service: &str, endpoint: &str, key_field: KeyField) -> Self {
        Self {
            name: name.to_string(),
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            fields: Vec::new(),
            key_field,
            pagination: None,
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub descending: bool,
    pub page: u32,
    pub rows_per_page: u32,
    #[serde(default)]
    pub rows_number: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            sort_by: None,
            descending: false,
            page: 1,
            rows_per_page: 20,
            rows_number: 0,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, rows_per_page: u32) -> Self {
        Self {
            page,
            rows_per_page,
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, field: &str, descending: bool) -> Self {
        self.sort_by = Some(field.to_string());
        self.descending = descending;
        self
    }
}

/// Payload of a list request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub filter: Map<String, Value>,
}

impl ListQuery {
    pub fn paginated(pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            filter: Map::new(),
        }
    }

    pub fn with_filter(mut self, key: &str, value: Value) -> Self {
        self.filter.insert(key.to_string(), value);
        self
    }
}

/// One page of raw items plus the server-side total.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<RawItem>,
    pub total: u64,
}

/// Per-entity state exposed to the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    pub items: Vec<Record>,
    pub selected: Option<String>,
    pub search_string: String,
    pub filter_object: Map<String, Value>,
    pub public_selected: Vec<String>,
    /// Advisory only: concurrent requests may clear it early.
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Key value of a record as text, if the key field is present.
pub fn record_key(record: &Record, key_field: &KeyField) -> Option<String> {
    record
        .get(&key_field.field)
        .map(|value| scalar_text(&value.to_json()))
}

impl EntityState {
    pub fn new(pagination: Option<Pagination>) -> Self {
        Self {
            pagination,
            ..Default::default()
        }
    }

    pub fn position(&self, key_field: &KeyField, id: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| record_key(item, key_field).as_deref() == Some(id))
    }

    /// Replace the item with the same key, or append it.
    pub fn upsert(&mut self, key_field: &KeyField, item: Record) {
        let existing = record_key(&item, key_field).and_then(|id| self.position(key_field, &id));
        match existing {
            Some(index) => self.items[index] = item,
            None => self.items.push(item),
        }
    }

    pub fn remove(&mut self, key_field: &KeyField, id: &str) -> Option<Record> {
        self.position(key_field, id).map(|index| self.items.remove(index))
    }
}
