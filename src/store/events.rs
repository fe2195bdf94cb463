use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{ErrorMessage, SyncError};
use crate::model::Id;

/// Notifications published by the collection store after each operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    Loaded { entity: String, count: usize },
    DetailLoaded { entity: String, id: Id },
    Created { entity: String },
    /// A write went through; subscribers decide whether the list needs reloading.
    Updated { entity: String, id: Id },
    Deleted { entity: String, id: Id },
    Refreshed { entity: String, id: Id },
    Failed { entity: String, operation: String, error: ErrorMessage },
}

/// Most recent surfaced error. Every new failure overwrites the previous one.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<ErrorMessage>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, error: &SyncError) {
        *self.inner.lock() = Some(error.message());
    }

    pub fn get(&self) -> Option<ErrorMessage> {
        self.inner.lock().clone()
    }

    pub fn take(&self) -> Option<ErrorMessage> {
        self.inner.lock().take()
    }
}

/// Broadcast channel for store events. Sending without subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
