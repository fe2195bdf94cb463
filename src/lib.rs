pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod registry;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ErrorMessage, SyncError, SyncResult};
pub use logic::{
    compile_bracket, compile_predicate, decode, encode, filter_records, validate_record,
    Predicate, VariantEditor,
};
pub use model::*;
pub use registry::Registry;
pub use store::{CollectionStore, EntityApi, MemoryEntityApi, RestEntityApi, StoreEvent};

/// Bind every built-in entity to the configured REST service.
pub fn build_store(config: &crate::config::AppConfig) -> anyhow::Result<CollectionStore> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let store = CollectionStore::new();
    let registry = Registry::builtin(&config.remote.service);
    for descriptor in registry.iter() {
        let api = RestEntityApi::new(client.clone(), &config.remote.base_url, descriptor);
        store.register(descriptor.as_ref().clone(), std::sync::Arc::new(api));
    }
    Ok(store)
}

/// Router over a store bound to the configured remote service.
pub fn build_app(config: &crate::config::AppConfig) -> anyhow::Result<axum::Router> {
    let store = std::sync::Arc::new(build_store(config)?);
    log::info!("Bound {} entities", store.entity_names().len());
    Ok(crate::api::routes::create_router().with_state(store))
}

/// Load configuration and serve until the listener fails. Logging is set up by the caller.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let config = crate::config::AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}, remote={}/{}",
        config.server.host,
        config.server.port,
        config.remote.base_url,
        config.remote.service
    );
    let app = build_app(&config)?;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Entity sync server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
