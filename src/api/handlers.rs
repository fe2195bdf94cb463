use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{ErrorMessage, SyncError};
use crate::logic::{compile_bracket, compile_predicate};
use crate::model::{Capabilities, EntityState, FilterNode, ListQuery, Pagination, Record};
use crate::store::{CollectionStore, RouteParam};

pub type AppState = Arc<CollectionStore>;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_error: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            technical_error: None,
        }
    }
}

fn error_response(error: SyncError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        SyncError::UnknownEntity(_) => StatusCode::NOT_FOUND,
        SyncError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        SyncError::Validation { .. } | SyncError::InvalidPath(_) | SyncError::UnknownVariant(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SyncError::Server { .. } | SyncError::Transport { .. } => StatusCode::BAD_GATEWAY,
    };
    let message = error.message();
    let technical_error = match error {
        SyncError::Server { .. } | SyncError::Transport { .. } => Some(message.technical_error),
        _ => None,
    };
    (
        status,
        Json(ErrorResponse {
            error: message.text,
            technical_error,
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct EntitySummary {
    pub name: String,
    pub service: String,
    pub endpoint: String,
    pub url_key: String,
    pub capabilities: Capabilities,
}

/// List registered entities
pub async fn list_entities(State(store): State<AppState>) -> ApiResult<Vec<EntitySummary>> {
    let summaries = store
        .entity_names()
        .iter()
        .map(|name| {
            store.descriptor(name).map(|d| EntitySummary {
                name: d.name.clone(),
                service: d.service.clone(),
                endpoint: d.endpoint.clone(),
                url_key: d.key_field.url_key.clone(),
                capabilities: d.capabilities.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(error_response)?;
    Ok(Json(summaries))
}

/// Persisted UI state of one entity
pub async fn get_entity_state(
    State(store): State<AppState>,
    Path(entity): Path<String>,
) -> ApiResult<EntityState> {
    store.state(&entity).map(Json).map_err(error_response)
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadRequest {
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub filter: Map<String, Value>,
    /// Defaults to the entity's own capability
    pub paginated: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub items: Vec<Record>,
    pub state: EntityState,
}

/// Trigger a list load, then return the loaded items and the resulting state
pub async fn load_entity(
    State(store): State<AppState>,
    Path(entity): Path<String>,
    request: Option<RequestJson<LoadRequest>>,
) -> ApiResult<LoadResponse> {
    let request = request.map(|RequestJson(r)| r).unwrap_or_default();
    let descriptor = store.descriptor(&entity).map_err(error_response)?;
    let query = ListQuery {
        pagination: request.pagination,
        filter: request.filter,
    };

    let items = if request.paginated.unwrap_or(descriptor.capabilities.paginated) {
        store.get_paginated(&entity, query).await
    } else {
        store.get(&entity, query).await
    }
    .map_err(error_response)?;

    let state = store.state(&entity).map_err(error_response)?;
    Ok(Json(LoadResponse { items, state }))
}

pub async fn get_item(
    State(store): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Record> {
    store
        .get_detail(&entity, &id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_item(
    State(store): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    store
        .delete(&entity, &id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub selected: Option<String>,
}

/// Change the selection; the response is the route parameter to write back
pub async fn put_selection(
    State(store): State<AppState>,
    Path(entity): Path<String>,
    RequestJson(request): RequestJson<SelectionRequest>,
) -> ApiResult<RouteParam> {
    store
        .set_selected(&entity, request.selected)
        .map(Json)
        .map_err(error_response)
}

pub async fn get_last_error(State(store): State<AppState>) -> Json<Option<ErrorMessage>> {
    Json(store.last_error())
}

pub async fn clear_last_error(State(store): State<AppState>) -> Json<Option<ErrorMessage>> {
    Json(store.clear_error())
}

#[derive(Debug, Serialize)]
pub struct CompiledFilter {
    pub bracket: String,
    pub predicate: String,
}

/// Render a filter tree as bracket query text and as predicate text
pub async fn compile_filter(RequestJson(tree): RequestJson<FilterNode>) -> Json<CompiledFilter> {
    Json(CompiledFilter {
        bracket: compile_bracket(&tree),
        predicate: compile_predicate(&tree).to_string(),
    })
}
