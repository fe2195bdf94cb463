use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{SyncError, SyncResult};
use crate::model::{generate_id, scalar_text, ListQuery, Page, Patch, RawItem};
use crate::store::traits::EntityApi;

/// In-process entity binding over a vector of raw items.
///
/// Filters match by equality on the rendered value; an array filter value matches any of
/// its elements. Used for tests and for running the service without a remote backend.
pub struct MemoryEntityApi {
    key_field: String,
    items: RwLock<Vec<RawItem>>,
    read_only: bool,
    last_patch: RwLock<Option<Patch>>,
}

impl MemoryEntityApi {
    pub fn new(key_field: &str) -> Self {
        Self {
            key_field: key_field.to_string(),
            items: RwLock::new(Vec::new()),
            read_only: false,
            last_patch: RwLock::new(None),
        }
    }

    pub fn with_items(self, items: Vec<RawItem>) -> Self {
        *self.items.write() = items;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Insert or replace an item by key.
    pub fn put(&self, item: RawItem) {
        let mut items = self.items.write();
        let key = item.get(&self.key_field).map(scalar_text);
        match key.and_then(|k| self.index_of(&items, &k)) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
    }

    pub fn items(&self) -> Vec<RawItem> {
        self.items.read().clone()
    }

    /// Most recent patch received by `update`.
    pub fn last_patch(&self) -> Option<Patch> {
        self.last_patch.read().clone()
    }

    fn index_of(&self, items: &[RawItem], id: &str) -> Option<usize> {
        items
            .iter()
            .position(|item| item.get(&self.key_field).map(scalar_text).as_deref() == Some(id))
    }

    fn not_found(&self, id: &str) -> SyncError {
        SyncError::Server {
            technical_error: "HTTP 404".to_string(),
            text: format!("{} {} not found", self.key_field, id),
        }
    }

    fn check_writable(&self, operation: &str) -> SyncResult<()> {
        if self.read_only {
            return Err(SyncError::unsupported(operation));
        }
        Ok(())
    }

    fn matching(&self, query: &ListQuery) -> Vec<RawItem> {
        let mut matched: Vec<RawItem> = self
            .items
            .read()
            .iter()
            .filter(|item| matches_filter(item, &query.filter))
            .cloned()
            .collect();

        if let Some(sort_by) = query.pagination.as_ref().and_then(|p| p.sort_by.as_deref()) {
            let descending = query.pagination.as_ref().is_some_and(|p| p.descending);
            matched.sort_by(|a, b| {
                let ordering = compare_field(a.get(sort_by), b.get(sort_by));
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        matched
    }
}

fn matches_filter(item: &RawItem, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(field, expected)| {
        let actual = item.get(field).map(scalar_text).unwrap_or_default();
        match expected {
            Value::Null => true,
            Value::String(s) if s.is_empty() => true,
            Value::Array(options) if options.is_empty() => true,
            Value::Array(options) => options.iter().any(|o| scalar_text(o) == actual),
            other => scalar_text(other) == actual,
        }
    })
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.and_then(Value::as_f64), b.and_then(Value::as_f64)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => {
            let x = a.map(scalar_text).unwrap_or_default();
            let y = b.map(scalar_text).unwrap_or_default();
            x.cmp(&y)
        }
    }
}

#[async_trait::async_trait]
impl EntityApi for MemoryEntityApi {
    async fn get(&self, query: &ListQuery) -> SyncResult<Vec<RawItem>> {
        Ok(self.matching(query))
    }

    async fn get_paginated(&self, query: &ListQuery) -> SyncResult<Page> {
        let matched = self.matching(query);
        let total = matched.len() as u64;
        let items = match &query.pagination {
            Some(p) if p.rows_per_page > 0 => {
                let skip = (p.page.max(1) as usize - 1) * p.rows_per_page as usize;
                matched
                    .into_iter()
                    .skip(skip)
                    .take(p.rows_per_page as usize)
                    .collect()
            }
            _ => matched,
        };
        Ok(Page { items, total })
    }

    async fn get_detail(&self, id: &str) -> SyncResult<RawItem> {
        let items = self.items.read();
        self.index_of(&items, id)
            .map(|index| items[index].clone())
            .ok_or_else(|| self.not_found(id))
    }

    async fn create(&self, payload: &Value) -> SyncResult<Value> {
        self.check_writable("create")?;
        let mut item = match payload {
            Value::Object(map) => map.clone(),
            _ => {
                return Err(SyncError::Server {
                    technical_error: "HTTP 400".to_string(),
                    text: "payload must be an object".to_string(),
                })
            }
        };
        if !item.contains_key(&self.key_field) {
            item.insert(self.key_field.clone(), Value::String(generate_id()));
        }
        self.items.write().push(item.clone());
        Ok(Value::Object(item))
    }

    async fn update(&self, id: &str, patch: &Patch) -> SyncResult<Value> {
        self.check_writable("update")?;
        let mut items = self.items.write();
        let index = self.index_of(&items, id).ok_or_else(|| self.not_found(id))?;
        for (key, value) in patch {
            items[index].insert(key.clone(), value.clone());
        }
        *self.last_patch.write() = Some(patch.clone());
        Ok(Value::Object(items[index].clone()))
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.check_writable("delete")?;
        let mut items = self.items.write();
        let index = self.index_of(&items, id).ok_or_else(|| self.not_found(id))?;
        items.remove(index);
        Ok(())
    }
}
