use entity_sync::config::{AppConfig, RemoteConfig};
use entity_sync::{build_store, CollectionStore, FieldValue, ListQuery, StoreEvent, SyncError};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn store_for(server: &MockServer) -> CollectionStore {
    let config = AppConfig {
        remote: RemoteConfig {
            base_url: format!("{}/api", server.uri()),
            service: "console".to_string(),
        },
        ..AppConfig::default()
    };
    build_store(&config).unwrap()
}

fn prompt(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "active_variant": "variant_0",
        "variants": [{"variant": "variant_0", "template": "Hello"}],
        "is_public": 1,
        "updated_at": "2024-05-06T07:08:09Z"
    })
}

#[tokio::test]
async fn test_paginated_list_sends_query_and_tracks_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/console/prompts"))
        .and(query_param("currentPage", "1"))
        .and(query_param("pageSize", "20"))
        .and(query_param("orderBy", "updated_at"))
        .and(query_param("sortOrder", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [prompt("p1", "greeter"), prompt("p2", "closer")],
            "total": 42
        })))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let items = store
        .get_paginated("prompts", ListQuery::default())
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["is_public"], FieldValue::Bool(true));
    assert!(matches!(items[0]["updated_at"], FieldValue::Date(_)));

    let state = store.state("prompts").unwrap();
    assert_eq!(state.pagination.unwrap().rows_number, 42);
    assert_eq!(state.public_selected, vec!["p1".to_string()]);
    assert!(store.last_error().is_none());
}

#[tokio::test]
async fn test_server_error_payload_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/console/agents"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "pageSize too large"})),
        )
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let mut events = store.subscribe();
    let result = store.get_paginated("agents", ListQuery::default()).await;

    assert_eq!(
        result,
        Err(SyncError::Server {
            technical_error: "HTTP 400".to_string(),
            text: "pageSize too large".to_string(),
        })
    );
    let error = store.last_error().unwrap();
    assert_eq!(error.text, "pageSize too large");
    assert!(!store.state("agents").unwrap().loading);
    assert!(matches!(
        events.recv().await.unwrap(),
        StoreEvent::Failed { .. }
    ));
}

#[tokio::test]
async fn test_bad_status_without_payload_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/console/api-tools"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let result = store.get("api_tools", ListQuery::default()).await;
    assert!(matches!(result, Err(SyncError::Transport { .. })));
    assert_eq!(store.last_error().unwrap().technical_error, "HTTP 503");
}

#[tokio::test]
async fn test_save_patches_only_changed_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/console/prompts/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prompt("p1", "greeter")))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/console/prompts/p1"))
        .and(body_json(json!({"name": "welcomer", "is_public": "false"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let original = store.get_detail("prompts", "p1").await.unwrap();
    let mut edited = original.clone();
    edited.insert("name".to_string(), FieldValue::from("welcomer"));
    edited.insert("is_public".to_string(), FieldValue::Bool(false));
    edited.insert("updated_at".to_string(), FieldValue::from("2031-01-01T00:00:00Z"));

    let response = store.save("prompts", "p1", &edited, &original).await.unwrap();
    assert_eq!(response, Some(json!({"ok": true})));
}

#[tokio::test]
async fn test_datasource_children_are_flattened() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/console/datasources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "d1",
            "name": "archive",
            "source": "s3",
            "s3": {"bucket": "logs", "prefix": "2024/"},
            "enabled": "true"
        }])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let items = store.get("datasources", ListQuery::default()).await.unwrap();

    assert_eq!(items[0]["bucket"], FieldValue::from("logs"));
    assert_eq!(items[0]["prefix"], FieldValue::from("2024/"));
    assert_eq!(items[0]["enabled"], FieldValue::Bool(true));
    assert!(!items[0].contains_key("s3"));
}

#[tokio::test]
async fn test_refresh_and_read_only_collection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/datasources/d1/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert_eq!(
        store.refresh("datasources", "d1").await,
        Ok(json!({"status": "queued"}))
    );

    let result = store.delete("prompt_history", "r1").await;
    assert_eq!(result, Err(SyncError::unsupported("delete")));
    assert_eq!(store.last_error().unwrap().text, "delete doesn't exist");

    assert_eq!(
        store.refresh("prompts", "p1").await,
        Err(SyncError::unsupported("refresh"))
    );
}

#[tokio::test]
async fn test_create_reloads_through_remote() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/rag-tools"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "r9"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/console/rag-tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [prompt("r9", "indexer")],
            "total": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let created = store
        .create("rag_tools", json!({"name": "indexer"}))
        .await
        .unwrap();
    assert_eq!(created["id"], "r9");

    let state = store.state("rag_tools").unwrap();
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.pagination.unwrap().rows_number, 1);
}
