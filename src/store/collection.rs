use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{ErrorMessage, SyncError, SyncResult};
use crate::logic::{decode, decode_item, encode, validate_record};
use crate::model::{
    record_key, EntityDescriptor, EntityState, ListQuery, Patch, Record,
};
use crate::store::events::{ErrorSlot, EventBus, StoreEvent};
use crate::store::traits::EntityApi;

struct EntitySlot {
    descriptor: Arc<EntityDescriptor>,
    api: Arc<dyn EntityApi>,
    state: EntityState,
    /// Number of the newest list request issued for this entity
    generation: u64,
}

/// Route parameter written back to the router when the selection changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteParam {
    pub key: String,
    pub value: Option<String>,
}

/// Entity-scoped lifecycle operations over bound remote collections.
///
/// Operations on the same entity are not serialized against each other: concurrent list
/// loads race and the last response to arrive wins. Failures are returned to the caller and
/// also land in the shared error slot as a [`StoreEvent::Failed`]. `get_detail` only returns
/// its error.
pub struct CollectionStore {
    entities: RwLock<HashMap<String, EntitySlot>>,
    errors: ErrorSlot,
    events: EventBus,
}

impl CollectionStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            errors: ErrorSlot::new(),
            events: EventBus::default(),
        }
    }

    /// Bind an entity descriptor to its remote operations.
    pub fn register(&self, descriptor: EntityDescriptor, api: Arc<dyn EntityApi>) {
        let name = descriptor.name.clone();
        let state = EntityState::new(descriptor.pagination.clone());
        self.entities.write().insert(
            name,
            EntitySlot {
                descriptor: Arc::new(descriptor),
                api,
                state,
                generation: 0,
            },
        );
    }

    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptor(&self, entity: &str) -> SyncResult<Arc<EntityDescriptor>> {
        self.binding(entity).map(|(descriptor, _)| descriptor)
    }

    /// Snapshot of the state the rendering layer reads.
    pub fn state(&self, entity: &str) -> SyncResult<EntityState> {
        self.with_slot(entity, |slot| slot.state.clone())
    }

    pub fn last_error(&self) -> Option<ErrorMessage> {
        self.errors.get()
    }

    pub fn clear_error(&self) -> Option<ErrorMessage> {
        self.errors.take()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn binding(&self, entity: &str) -> SyncResult<(Arc<EntityDescriptor>, Arc<dyn EntityApi>)> {
        self.with_slot(entity, |slot| (slot.descriptor.clone(), slot.api.clone()))
    }

    fn with_slot<R>(&self, entity: &str, f: impl FnOnce(&mut EntitySlot) -> R) -> SyncResult<R> {
        let mut entities = self.entities.write();
        entities
            .get_mut(entity)
            .map(f)
            .ok_or_else(|| SyncError::UnknownEntity(entity.to_string()))
    }

    /// Overwrite the shared error slot and notify subscribers.
    fn fail(&self, entity: &str, operation: &str, error: SyncError) -> SyncError {
        warn!("{} on {} failed: {}", operation, entity, error);
        self.errors.set(&error);
        self.events.publish(StoreEvent::Failed {
            entity: entity.to_string(),
            operation: operation.to_string(),
            error: error.message(),
        });
        error
    }

    /// Mark the entity loading and fill unset query parts from its state.
    fn begin_list(&self, entity: &str, mut query: ListQuery) -> SyncResult<(ListQuery, u64)> {
        self.with_slot(entity, |slot| {
            slot.state.loading = true;
            slot.generation += 1;
            if query.pagination.is_none() {
                query.pagination = slot.state.pagination.clone();
            }
            if query.filter.is_empty() {
                query.filter = slot.state.filter_object.clone();
            }
            (query, slot.generation)
        })
    }

    fn end_list(&self, entity: &str, generation: u64) {
        let _ = self.with_slot(entity, |slot| {
            slot.state.loading = false;
            if generation < slot.generation {
                // Last write wins: the older response is still applied
                warn!(
                    "Stale list response for {} (request {} of {}) applied",
                    entity, generation, slot.generation
                );
            }
        });
    }

    /// Load one page, store it with the server-side total, and return the decoded items.
    ///
    /// Missing pagination or filter in `query` fall back to the entity's current state.
    pub async fn get_paginated(&self, entity: &str, query: ListQuery) -> SyncResult<Vec<Record>> {
        let (descriptor, api) = self
            .binding(entity)
            .map_err(|e| self.fail(entity, "getPaginated", e))?;
        let (query, generation) = self.begin_list(entity, query)?;
        debug!("Loading page of {} ({:?})", entity, query.pagination);

        let result = api.get_paginated(&query).await;
        let outcome = match result {
            Ok(page) => {
                let items = decode(&page.items, &descriptor.fields, false);
                self.with_slot(entity, |slot| {
                    slot.state.items = items.clone();
                    // Entities loaded without pagination keep none in their state
                    if let Some(mut pagination) = query.pagination.clone() {
                        pagination.rows_number = page.total;
                        slot.state.pagination = Some(pagination);
                    }
                    select_default_public(&mut slot.state, &descriptor);
                })?;
                self.events.publish(StoreEvent::Loaded {
                    entity: entity.to_string(),
                    count: items.len(),
                });
                Ok(items)
            }
            Err(e) => Err(self.fail(entity, "getPaginated", e)),
        };
        self.end_list(entity, generation);
        outcome
    }

    /// Load the whole collection without total tracking.
    pub async fn get(&self, entity: &str, query: ListQuery) -> SyncResult<Vec<Record>> {
        let (descriptor, api) = self
            .binding(entity)
            .map_err(|e| self.fail(entity, "get", e))?;
        let (query, generation) = self.begin_list(entity, query)?;
        debug!("Loading {}", entity);

        let outcome = match api.get(&query).await {
            Ok(raw_items) => {
                let items = decode(&raw_items, &descriptor.fields, false);
                self.with_slot(entity, |slot| {
                    slot.state.items = items.clone();
                    select_default_public(&mut slot.state, &descriptor);
                })?;
                self.events.publish(StoreEvent::Loaded {
                    entity: entity.to_string(),
                    count: items.len(),
                });
                Ok(items)
            }
            Err(e) => Err(self.fail(entity, "get", e)),
        };
        self.end_list(entity, generation);
        outcome
    }

    /// Fetch one record and merge it into the item list.
    ///
    /// Failures are returned but never written to the shared error slot.
    pub async fn get_detail(&self, entity: &str, id: &str) -> SyncResult<Record> {
        let (descriptor, api) = self.binding(entity)?;
        match api.get_detail(id).await {
            Ok(raw) => {
                let record = decode_item(&raw, &descriptor.fields, false);
                self.with_slot(entity, |slot| {
                    slot.state.upsert(&descriptor.key_field, record.clone())
                })?;
                self.events.publish(StoreEvent::DetailLoaded {
                    entity: entity.to_string(),
                    id: id.to_string(),
                });
                Ok(record)
            }
            Err(e) => {
                debug!("Detail {} of {} not loaded: {}", id, entity, e);
                Err(e)
            }
        }
    }

    /// Create a record, then reload the list instead of inserting optimistically.
    pub async fn create(&self, entity: &str, payload: Value) -> SyncResult<Value> {
        let (descriptor, api) = self
            .binding(entity)
            .map_err(|e| self.fail(entity, "create", e))?;
        let created = api
            .create(&payload)
            .await
            .map_err(|e| self.fail(entity, "create", e))?;
        info!("Created record in {}", entity);
        self.events.publish(StoreEvent::Created {
            entity: entity.to_string(),
        });

        // A failed reload has already been surfaced; the create itself succeeded
        let _ = if descriptor.capabilities.paginated {
            self.get_paginated(entity, ListQuery::default()).await
        } else {
            self.get(entity, ListQuery::default()).await
        };
        Ok(created)
    }

    /// Send a patch. Does not reload; subscribers receive [`StoreEvent::Updated`].
    pub async fn update(&self, entity: &str, id: &str, patch: Patch) -> SyncResult<Value> {
        let (_, api) = self
            .binding(entity)
            .map_err(|e| self.fail(entity, "update", e))?;
        let response = api
            .update(id, &patch)
            .await
            .map_err(|e| self.fail(entity, "update", e))?;
        info!("Updated {} in {} ({} fields)", id, entity, patch.len());
        self.events.publish(StoreEvent::Updated {
            entity: entity.to_string(),
            id: id.to_string(),
        });
        Ok(response)
    }

    /// Validate the edited record and send only what changed since `original`.
    ///
    /// Returns `None` without a request when nothing patch-eligible changed.
    pub async fn save(
        &self,
        entity: &str,
        id: &str,
        edited: &Record,
        original: &Record,
    ) -> SyncResult<Option<Value>> {
        let descriptor = self
            .descriptor(entity)
            .map_err(|e| self.fail(entity, "update", e))?;
        if let Some(violation) = validate_record(edited, &descriptor.fields).into_iter().next() {
            return Err(self.fail(entity, "update", violation));
        }

        let patch = encode(edited, original, &descriptor.fields);
        if patch.is_empty() {
            debug!("Nothing to save for {} in {}", id, entity);
            return Ok(None);
        }
        self.update(entity, id, patch).await.map(Some)
    }

    /// Delete remotely, then drop the record from the local list.
    pub async fn delete(&self, entity: &str, id: &str) -> SyncResult<()> {
        let (descriptor, api) = self
            .binding(entity)
            .map_err(|e| self.fail(entity, "delete", e))?;
        api.delete(id)
            .await
            .map_err(|e| self.fail(entity, "delete", e))?;
        self.with_slot(entity, |slot| slot.state.remove(&descriptor.key_field, id))?;
        info!("Deleted {} from {}", id, entity);
        self.events.publish(StoreEvent::Deleted {
            entity: entity.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    pub async fn refresh(&self, entity: &str, id: &str) -> SyncResult<Value> {
        let (_, api) = self
            .binding(entity)
            .map_err(|e| self.fail(entity, "refresh", e))?;
        let response = api
            .refresh(id)
            .await
            .map_err(|e| self.fail(entity, "refresh", e))?;
        self.events.publish(StoreEvent::Refreshed {
            entity: entity.to_string(),
            id: id.to_string(),
        });
        Ok(response)
    }

    /// Derive the selection from route parameters, optionally loading its detail.
    pub async fn select_from_router(
        &self,
        entity: &str,
        params: &HashMap<String, String>,
        detail: bool,
    ) -> SyncResult<Option<String>> {
        let descriptor = self.descriptor(entity)?;
        let selected = params.get(&descriptor.key_field.url_key).cloned();
        self.with_slot(entity, |slot| slot.state.selected = selected.clone())?;

        if let (true, Some(id)) = (detail, selected.as_deref()) {
            // Detail failures stay out of the error slot
            let _ = self.get_detail(entity, id).await;
        }
        Ok(selected)
    }

    /// Change the selection and return the route parameter to write back.
    pub fn set_selected(&self, entity: &str, selected: Option<String>) -> SyncResult<RouteParam> {
        let descriptor = self.descriptor(entity)?;
        self.with_slot(entity, |slot| slot.state.selected = selected.clone())?;
        Ok(RouteParam {
            key: descriptor.key_field.url_key.clone(),
            value: selected,
        })
    }

    pub fn set_search_string(&self, entity: &str, search: &str) -> SyncResult<()> {
        self.with_slot(entity, |slot| slot.state.search_string = search.to_string())
    }

    pub fn set_filter_object(&self, entity: &str, filter: serde_json::Map<String, Value>) -> SyncResult<()> {
        self.with_slot(entity, |slot| slot.state.filter_object = filter)
    }

    pub fn set_public_selected(&self, entity: &str, keys: Vec<String>) -> SyncResult<()> {
        self.with_slot(entity, |slot| slot.state.public_selected = keys)
    }
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The first load of an entity publicly selects its first item.
fn select_default_public(state: &mut EntityState, descriptor: &EntityDescriptor) {
    if !state.public_selected.is_empty() {
        return;
    }
    if let Some(key) = state
        .items
        .first()
        .and_then(|item| record_key(item, &descriptor.key_field))
    {
        state.public_selected.push(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDescriptor, FieldValue, KeyField, Pagination, Page, RawItem};
    use crate::store::memory::MemoryEntityApi;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("prompts", "console", "prompts", KeyField::new("id", "promptId"))
            .with_fields(vec![
                FieldDescriptor::text("id").ignore_patch(),
                FieldDescriptor::text("name").rule(crate::model::Rule::Required),
                FieldDescriptor::boolean("is_public"),
                FieldDescriptor::date("updated_at").ignore_patch(),
            ])
            .with_pagination(Pagination::new(1, 2))
    }

    fn raw(value: Value) -> RawItem {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> (CollectionStore, Arc<MemoryEntityApi>) {
        let api = Arc::new(MemoryEntityApi::new("id").with_items(vec![
            raw(json!({"id": "1", "name": "alpha", "is_public": 1})),
            raw(json!({"id": "2", "name": "beta", "is_public": 0})),
            raw(json!({"id": "3", "name": "gamma", "is_public": "true"})),
        ]));
        let store = CollectionStore::new();
        store.register(descriptor(), api.clone());
        (store, api)
    }

    /// Always fails with the given server message.
    struct FailingApi;

    #[async_trait::async_trait]
    impl EntityApi for FailingApi {
        async fn get(&self, query: &ListQuery) -> SyncResult<Vec<RawItem>> {
            let reason = query
                .filter
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("boom")
                .to_string();
            Err(SyncError::Server {
                technical_error: "HTTP 500".to_string(),
                text: reason,
            })
        }
    }

    /// Each call waits for the next queued response.
    struct GatedApi {
        pending: Mutex<VecDeque<oneshot::Receiver<Vec<RawItem>>>>,
    }

    #[async_trait::async_trait]
    impl EntityApi for GatedApi {
        async fn get(&self, _query: &ListQuery) -> SyncResult<Vec<RawItem>> {
            let receiver = self.pending.lock().pop_front();
            match receiver {
                Some(receiver) => receiver
                    .await
                    .map_err(|e| SyncError::transport(e, "gate closed")),
                None => Ok(Vec::new()),
            }
        }

        async fn get_paginated(&self, query: &ListQuery) -> SyncResult<Page> {
            let items = self.get(query).await?;
            Ok(Page {
                total: items.len() as u64,
                items,
            })
        }
    }

    #[tokio::test]
    async fn test_get_paginated_decodes_and_tracks_total() {
        let (store, _) = seeded();
        let items = store
            .get_paginated("prompts", ListQuery::default())
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["is_public"], FieldValue::Bool(true));
        assert_eq!(items[1]["is_public"], FieldValue::Bool(false));

        let state = store.state("prompts").unwrap();
        assert!(!state.loading);
        assert_eq!(state.pagination.as_ref().unwrap().rows_number, 3);
        assert_eq!(state.public_selected, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_unpaginated_entity_keeps_no_pagination() {
        let api = Arc::new(MemoryEntityApi::new("id").with_items(vec![
            raw(json!({"id": "1", "name": "alpha"})),
            raw(json!({"id": "2", "name": "beta"})),
        ]));
        let mut plain = descriptor();
        plain.pagination = None;
        let store = CollectionStore::new();
        store.register(plain, api);

        let items = store
            .get_paginated("prompts", ListQuery::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(store.state("prompts").unwrap().pagination, None);
    }

    #[tokio::test]
    async fn test_public_selection_is_only_defaulted_once() {
        let (store, _) = seeded();
        store.set_public_selected("prompts", vec!["3".to_string()]).unwrap();
        store.get("prompts", ListQuery::default()).await.unwrap();
        assert_eq!(store.state("prompts").unwrap().public_selected, vec!["3".to_string()]);
    }

    #[tokio::test]
    async fn test_get_detail_replaces_or_appends() {
        let (store, api) = seeded();
        store
            .get_paginated("prompts", ListQuery::default())
            .await
            .unwrap();

        api.put(raw(json!({"id": "1", "name": "alpha-2"})));
        store.get_detail("prompts", "1").await.unwrap();
        store.get_detail("prompts", "3").await.unwrap();

        let state = store.state("prompts").unwrap();
        assert_eq!(state.items.len(), 3);
        assert_eq!(state.items[0]["name"], FieldValue::from("alpha-2"));
        assert_eq!(state.items[2]["name"], FieldValue::from("gamma"));
    }

    #[tokio::test]
    async fn test_get_detail_failure_leaves_error_slot_alone() {
        let (store, _) = seeded();
        let mut events = store.subscribe();
        let result = store.get_detail("prompts", "404").await;
        assert!(result.is_err());
        assert!(store.last_error().is_none());
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_errors_overwrite_the_shared_slot() {
        let store = CollectionStore::new();
        store.register(descriptor(), Arc::new(FailingApi));

        let first = store
            .get("prompts", ListQuery::default().with_filter("reason", json!("first")))
            .await;
        let second = store
            .get("prompts", ListQuery::default().with_filter("reason", json!("second")))
            .await;

        assert!(first.is_err() && second.is_err());
        assert_eq!(store.last_error().unwrap().text, "second");
        assert!(!store.state("prompts").unwrap().loading);
    }

    #[tokio::test]
    async fn test_unsupported_operation_is_surfaced() {
        let store = CollectionStore::new();
        store.register(descriptor(), Arc::new(FailingApi));

        let result = store.refresh("prompts", "1").await;
        assert_eq!(result, Err(SyncError::unsupported("refresh")));
        assert_eq!(store.last_error().unwrap().text, "refresh doesn't exist");
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let store = CollectionStore::new();
        let result = store.get("nope", ListQuery::default()).await;
        assert_eq!(result, Err(SyncError::UnknownEntity("nope".to_string())));
    }

    #[tokio::test]
    async fn test_create_reloads_list() {
        let (store, _) = seeded();
        let mut events = store.subscribe();
        store
            .create("prompts", json!({"name": "delta"}))
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::Created {
                entity: "prompts".to_string()
            }
        );
        assert!(matches!(events.recv().await.unwrap(), StoreEvent::Loaded { .. }));
        let state = store.state("prompts").unwrap();
        assert_eq!(state.pagination.unwrap().rows_number, 4);
    }

    #[tokio::test]
    async fn test_save_sends_only_changed_fields() {
        let (store, api) = seeded();
        let items = store.get("prompts", ListQuery::default()).await.unwrap();
        let original = items[0].clone();
        let mut edited = original.clone();
        edited.insert("name".to_string(), FieldValue::from("alpha-renamed"));
        edited.insert("updated_at".to_string(), FieldValue::from("2030-01-01"));

        let mut events = store.subscribe();
        let response = store.save("prompts", "1", &edited, &original).await.unwrap();
        assert!(response.is_some());
        assert_eq!(
            api.last_patch().map(Value::Object),
            Some(json!({"name": "alpha-renamed"}))
        );
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::Updated {
                entity: "prompts".to_string(),
                id: "1".to_string()
            }
        );

        // Identical records never reach the remote service
        assert_eq!(store.save("prompts", "1", &original, &original).await, Ok(None));
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_record() {
        let (store, api) = seeded();
        let items = store.get("prompts", ListQuery::default()).await.unwrap();
        let mut edited = items[0].clone();
        edited.insert("name".to_string(), FieldValue::from(""));

        let result = store.save("prompts", "1", &edited, &items[0]).await;
        assert!(matches!(result, Err(SyncError::Validation { .. })));
        assert!(api.last_patch().is_none());
        assert!(store.last_error().is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_local_item() {
        let (store, _) = seeded();
        store.get("prompts", ListQuery::default()).await.unwrap();
        store.delete("prompts", "2").await.unwrap();

        let state = store.state("prompts").unwrap();
        assert_eq!(state.items.len(), 2);
        assert!(state.position(&KeyField::new("id", "promptId"), "2").is_none());
    }

    #[tokio::test]
    async fn test_select_from_router_chains_detail() {
        let (store, _) = seeded();
        let params = HashMap::from([("promptId".to_string(), "3".to_string())]);

        let selected = store.select_from_router("prompts", &params, true).await.unwrap();
        assert_eq!(selected.as_deref(), Some("3"));
        let state = store.state("prompts").unwrap();
        assert_eq!(state.selected.as_deref(), Some("3"));
        assert_eq!(state.items.len(), 1);

        let missing = HashMap::from([("promptId".to_string(), "99".to_string())]);
        store.select_from_router("prompts", &missing, true).await.unwrap();
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn test_set_selected_returns_route_param() {
        let (store, _) = seeded();
        let param = store.set_selected("prompts", Some("2".to_string())).unwrap();
        assert_eq!(
            param,
            RouteParam {
                key: "promptId".to_string(),
                value: Some("2".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_loads_last_response_wins() {
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let api = GatedApi {
            pending: Mutex::new(VecDeque::from([first_rx, second_rx])),
        };
        let store = CollectionStore::new();
        store.register(descriptor(), Arc::new(api));

        let release = async {
            second_tx
                .send(vec![raw(json!({"id": "new"}))])
                .unwrap();
            // Let the newer response land before the older one
            while store.state("prompts").unwrap().items.is_empty() {
                tokio::task::yield_now().await;
            }
            first_tx.send(vec![raw(json!({"id": "old"}))]).unwrap();
        };

        let (a, b, _) = tokio::join!(
            store.get("prompts", ListQuery::default()),
            store.get("prompts", ListQuery::default()),
            release
        );
        assert!(a.is_ok() && b.is_ok());

        let state = store.state("prompts").unwrap();
        assert_eq!(state.items[0]["id"], FieldValue::from("old"));
        assert!(!state.loading);
    }
}
