use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::Id;

pub type VariantKey = String;

pub const VARIANT_KEY_PREFIX: &str = "variant_";

/// One named draft/version of a configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub variant: VariantKey,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Variant {
    pub fn new(key: &str) -> Self {
        Self {
            variant: key.to_string(),
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    /// Trailing number of a `variant_<n>` style key.
    pub fn key_number(&self) -> Option<u64> {
        let digits: String = self
            .variant
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return None;
        }
        digits.chars().rev().collect::<String>().parse().ok()
    }
}

/// Versioned configuration object (prompt, agent, retrieval tool ...).
///
/// `active_variant` is the published variant and must name one of `variants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigObject {
    pub id: Id,
    pub active_variant: VariantKey,
    pub variants: Vec<Variant>,
    /// Top-level fields shared by all variants (name, description ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ConfigObject {
    pub fn new(id: &str, first: Variant) -> Self {
        Self {
            id: id.to_string(),
            active_variant: first.variant.clone(),
            variants: vec![first],
            fields: Map::new(),
        }
    }

    pub fn variant(&self, key: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.variant == key)
    }

    pub fn variant_mut(&mut self, key: &str) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.variant == key)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.variant == key)
    }

    pub fn active(&self) -> Option<&Variant> {
        self.variant(&self.active_variant)
    }

    pub fn to_json(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
