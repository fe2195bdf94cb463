use log::debug;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::logic::build_query_params;
use crate::model::{Capabilities, EntityDescriptor, ListQuery, Page, Patch, RawItem};
use crate::store::traits::EntityApi;

/// Entity binding against a JSON REST service at `{base_url}/{service}/{endpoint}`.
pub struct RestEntityApi {
    client: Client,
    collection_url: String,
    capabilities: Capabilities,
}

impl RestEntityApi {
    pub fn new(client: Client, base_url: &str, descriptor: &EntityDescriptor) -> Self {
        Self {
            client,
            collection_url: format!(
                "{}/{}/{}",
                base_url.trim_end_matches('/'),
                descriptor.service,
                descriptor.endpoint
            ),
            capabilities: descriptor.capabilities.clone(),
        }
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url, urlencoding::encode(id))
    }

    fn list_url(&self, query: &ListQuery) -> String {
        let params = build_query_params(query.pagination.as_ref(), &query.filter);
        if params.is_empty() {
            self.collection_url.clone()
        } else {
            format!("{}?{}", self.collection_url, params)
        }
    }

    fn check_writable(&self, operation: &str) -> SyncResult<()> {
        if self.capabilities.read_only {
            return Err(SyncError::unsupported(operation));
        }
        Ok(())
    }

    /// Send a request and normalize every failure mode into a `SyncError`.
    async fn send(&self, method: Method, url: String, body: Option<&Value>) -> SyncResult<Value> {
        debug!("{} {}", method, url);
        let mut request: RequestBuilder = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::transport(e, "Network error"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SyncError::transport(e, "Could not read response"))?;

        let parsed = if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&text)
        };

        match parsed {
            Ok(value) => {
                if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
                    return Err(SyncError::Server {
                        technical_error: format!("HTTP {}", status.as_u16()),
                        text: error_text(error),
                    });
                }
                if !status.is_success() {
                    return Err(SyncError::transport(
                        format!("HTTP {}", status.as_u16()),
                        "Request failed",
                    ));
                }
                Ok(value)
            }
            Err(_) if !status.is_success() => Err(SyncError::transport(
                format!("HTTP {}", status.as_u16()),
                "Request failed",
            )),
            Err(e) => Err(SyncError::transport(e, "Invalid response")),
        }
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

/// Accept a bare array, `{items, total}` or `{data, total}` (total may be `rowsNumber`).
fn parse_list(body: Value) -> SyncResult<Page> {
    let (items, total) = match body {
        Value::Array(items) => {
            let total = items.len() as u64;
            (items, Some(total))
        }
        Value::Object(mut map) => {
            let items = match map.remove("items").or_else(|| map.remove("data")) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(SyncError::transport(
                        "list response has no items array",
                        "Invalid response",
                    ))
                }
            };
            let total = map
                .get("total")
                .or_else(|| map.get("rowsNumber"))
                .and_then(Value::as_u64);
            (items, total)
        }
        _ => {
            return Err(SyncError::transport(
                "list response is not an array or object",
                "Invalid response",
            ))
        }
    };

    let items: Vec<RawItem> = items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(SyncError::transport("list item is not an object", "Invalid response")),
        })
        .collect::<SyncResult<_>>()?;
    let total = total.unwrap_or(items.len() as u64);
    Ok(Page { items, total })
}

#[async_trait::async_trait]
impl EntityApi for RestEntityApi {
    async fn get(&self, query: &ListQuery) -> SyncResult<Vec<RawItem>> {
        let body = self.send(Method::GET, self.list_url(query), None).await?;
        parse_list(body).map(|page| page.items)
    }

    async fn get_paginated(&self, query: &ListQuery) -> SyncResult<Page> {
        if !self.capabilities.paginated {
            return Err(SyncError::unsupported("getPaginated"));
        }
        let body = self.send(Method::GET, self.list_url(query), None).await?;
        parse_list(body)
    }

    async fn get_detail(&self, id: &str) -> SyncResult<RawItem> {
        if !self.capabilities.detail {
            return Err(SyncError::unsupported("getDetail"));
        }
        match self.send(Method::GET, self.item_url(id), None).await? {
            Value::Object(map) => Ok(map),
            _ => Err(SyncError::transport("detail is not an object", "Invalid response")),
        }
    }

    async fn create(&self, payload: &Value) -> SyncResult<Value> {
        self.check_writable("create")?;
        self.send(Method::POST, self.collection_url.clone(), Some(payload))
            .await
    }

    async fn update(&self, id: &str, patch: &Patch) -> SyncResult<Value> {
        self.check_writable("update")?;
        let body = Value::Object(patch.clone());
        self.send(Method::PATCH, self.item_url(id), Some(&body)).await
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.check_writable("delete")?;
        self.send(Method::DELETE, self.item_url(id), None).await?;
        Ok(())
    }

    async fn refresh(&self, id: &str) -> SyncResult<Value> {
        if !self.capabilities.refresh {
            return Err(SyncError::unsupported("refresh"));
        }
        let url = format!("{}/refresh", self.item_url(id));
        self.send(Method::POST, url, None).await
    }
}
