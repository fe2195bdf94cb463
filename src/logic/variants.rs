use log::debug;
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::logic::deep_equal::deep_equal;
use crate::logic::transform::encode_json;
use crate::model::{ConfigObject, FieldDescriptor, Patch, Variant, VARIANT_KEY_PREFIX};

/// Draft/published lifecycle of one configuration object.
///
/// Holds the live (edited) copy, the last-saved snapshot, and the variant currently being
/// edited. The same editor serves every versioned entity type.
#[derive(Debug, Clone)]
pub struct VariantEditor {
    live: ConfigObject,
    saved: ConfigObject,
    selected: String,
}

impl VariantEditor {
    /// Start editing `object`. The object must hold at least one variant and its
    /// `active_variant` must name one of them.
    pub fn new(object: ConfigObject) -> SyncResult<Self> {
        check_object(&object)?;
        Ok(Self {
            selected: object.active_variant.clone(),
            saved: object.clone(),
            live: object,
        })
    }

    /// Replace both the live copy and the snapshot, selecting the active variant.
    pub fn set_object(&mut self, object: ConfigObject) -> SyncResult<()> {
        check_object(&object)?;
        self.selected = object.active_variant.clone();
        self.saved = object.clone();
        self.live = object;
        Ok(())
    }

    pub fn object(&self) -> &ConfigObject {
        &self.live
    }

    pub fn saved(&self) -> &ConfigObject {
        &self.saved
    }

    pub fn selected_key(&self) -> &str {
        &self.selected
    }

    pub fn selected_variant(&self) -> Option<&Variant> {
        self.live.variant(&self.selected)
    }

    pub fn select_variant(&mut self, key: &str) -> SyncResult<()> {
        if self.live.variant(key).is_none() {
            return Err(SyncError::UnknownVariant(key.to_string()));
        }
        self.selected = key.to_string();
        Ok(())
    }

    /// Next free key: one past the highest trailing number among existing keys.
    pub fn next_variant_key(&self) -> String {
        let highest = self
            .live
            .variants
            .iter()
            .filter_map(Variant::key_number)
            .max()
            .unwrap_or(0);
        format!("{}{}", VARIANT_KEY_PREFIX, highest + 1)
    }

    /// Clone the selected variant (or `base`) under a new key and select it.
    pub fn create_variant(&mut self, base: Option<&str>) -> SyncResult<String> {
        let base_key = base.unwrap_or(&self.selected);
        let payload = match self.live.variant(base_key) {
            Some(variant) => variant.payload.clone(),
            None if base.is_some() => return Err(SyncError::UnknownVariant(base_key.to_string())),
            None => Map::new(),
        };

        let key = self.next_variant_key();
        debug!("Creating variant {} on {} from {}", key, self.live.id, base_key);
        self.live.variants.push(Variant {
            variant: key.clone(),
            payload,
        });
        self.selected = key.clone();
        Ok(key)
    }

    /// Remove the selected variant. Returns false when it is the last one.
    pub fn delete_variant(&mut self) -> bool {
        if self.live.variants.len() <= 1 {
            return false;
        }
        let Some(index) = self.live.position(&self.selected) else {
            return false;
        };

        let removed = self.live.variants.remove(index);
        let next = index.saturating_sub(1);
        self.selected = self.live.variants[next].variant.clone();
        if removed.variant == self.live.active_variant {
            self.live.active_variant = self.selected.clone();
        }
        true
    }

    /// Publish the selected variant.
    pub fn activate_variant(&mut self) {
        self.live.active_variant = self.selected.clone();
    }

    /// Discard every edit since the last snapshot.
    pub fn revert_changes(&mut self) {
        self.live = self.saved.clone();
        if self.live.variant(&self.selected).is_none() {
            self.selected = self.live.active_variant.clone();
        }
    }

    pub fn is_changed(&self) -> bool {
        !deep_equal(
            &Value::Object(self.live.to_json()),
            &Value::Object(self.saved.to_json()),
        )
    }

    /// Set a dot-separated property on the selected variant, creating intermediate objects.
    /// A `null` value deletes the leaf.
    pub fn set_property(&mut self, path: &str, value: Value) -> SyncResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) || segments[0] == "variant" {
            return Err(SyncError::InvalidPath(path.to_string()));
        }

        let selected = self.selected.clone();
        let variant = self
            .live
            .variant_mut(&selected)
            .ok_or(SyncError::UnknownVariant(selected))?;
        set_path(&mut variant.payload, &segments, value, path)
    }

    /// Patch between the live object and the snapshot.
    pub fn pending_patch(&self, fields: &[FieldDescriptor]) -> Patch {
        encode_json(&self.live.to_json(), &self.saved.to_json(), fields)
    }

    /// The live object was written successfully; it becomes the new snapshot.
    pub fn mark_saved(&mut self) {
        self.saved = self.live.clone();
    }
}

fn check_object(object: &ConfigObject) -> SyncResult<()> {
    if object.variant(&object.active_variant).is_none() {
        return Err(SyncError::UnknownVariant(object.active_variant.clone()));
    }
    Ok(())
}

fn set_path(
    target: &mut Map<String, Value>,
    segments: &[&str],
    value: Value,
    path: &str,
) -> SyncResult<()> {
    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(SyncError::InvalidPath(path.to_string())),
    };

    let mut current = target;
    for segment in parents {
        if value.is_null() && !current.contains_key(*segment) {
            // Nothing to delete below a missing parent
            return Ok(());
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => return Err(SyncError::InvalidPath(path.to_string())),
        };
    }

    if value.is_null() {
        current.remove(*leaf);
    } else {
        current.insert(leaf.to_string(), value);
    }
    Ok(())
}
