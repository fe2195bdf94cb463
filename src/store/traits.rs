use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::model::{ListQuery, Page, Patch, RawItem};

/// Remote operations bound to one entity type.
///
/// Only `get` is mandatory. Operations an entity does not offer keep the default body and
/// reject with `"<operation> doesn't exist"`.
#[async_trait::async_trait]
pub trait EntityApi: Send + Sync {
    /// List items without total tracking
    async fn get(&self, query: &ListQuery) -> SyncResult<Vec<RawItem>>;

    /// List one page of items plus the server-side total
    async fn get_paginated(&self, _query: &ListQuery) -> SyncResult<Page> {
        Err(SyncError::unsupported("getPaginated"))
    }

    /// Fetch a single record by key
    async fn get_detail(&self, _id: &str) -> SyncResult<RawItem> {
        Err(SyncError::unsupported("getDetail"))
    }

    async fn create(&self, _payload: &Value) -> SyncResult<Value> {
        Err(SyncError::unsupported("create"))
    }

    /// Send a partial update
    async fn update(&self, _id: &str, _patch: &Patch) -> SyncResult<Value> {
        Err(SyncError::unsupported("update"))
    }

    async fn delete(&self, _id: &str) -> SyncResult<()> {
        Err(SyncError::unsupported("delete"))
    }

    /// Ask the service to recompute a record (e.g. re-index a retrieval tool)
    async fn refresh(&self, _id: &str) -> SyncResult<Value> {
        Err(SyncError::unsupported("refresh"))
    }
}
