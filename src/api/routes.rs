use axum::{
    routing::{get, post, put},
    Router,
};

use crate::api::handlers::{self, AppState};

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Entity state
        .route("/entities", get(handlers::list_entities))
        .route("/entities/:entity", get(handlers::get_entity_state))
        .route("/entities/:entity/load", post(handlers::load_entity))
        .route(
            "/entities/:entity/items/:id",
            get(handlers::get_item).delete(handlers::delete_item),
        )
        .route("/entities/:entity/selection", put(handlers::put_selection))
        // Shared error slot
        .route(
            "/errors/last",
            get(handlers::get_last_error).delete(handlers::clear_last_error),
        )
        // Filter compilation
        .route("/filters/compile", post(handlers::compile_filter))
}
