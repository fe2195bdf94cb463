//! Built-in entity descriptors for the configuration console.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::{Capabilities, EntityDescriptor, FieldDescriptor, KeyField, Pagination, Rule};

/// Versioned objects sharing the variant lifecycle.
pub const VERSIONED_ENTITIES: [(&str, &str, &str); 5] = [
    ("prompts", "prompts", "promptId"),
    ("agents", "agents", "agentId"),
    ("rag_tools", "rag-tools", "ragToolId"),
    ("retrieval_tools", "retrieval-tools", "retrievalToolId"),
    ("api_tools", "api-tools", "apiToolId"),
];

/// Immutable lookup of entity descriptors by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entity the console knows about, bound to `service`.
    pub fn builtin(service: &str) -> Self {
        let mut registry = Self::new();
        for (name, endpoint, url_key) in VERSIONED_ENTITIES {
            registry.insert(versioned(name, service, endpoint, url_key));
        }
        registry.insert(datasources(service));
        registry.insert(prompt_history(service));
        registry
    }

    pub fn insert(&mut self, descriptor: EntityDescriptor) {
        self.entities
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntityDescriptor>> {
        self.entities.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Display name plus the identifier other services reference the object by.
fn name_fields() -> [FieldDescriptor; 2] {
    [
        FieldDescriptor::text("name")
            .rule(Rule::Required)
            .rule(Rule::NoInvisibleCharacters),
        FieldDescriptor::text("system_name")
            .rule(Rule::SystemName)
            .rule(Rule::NoInvisibleCharacters),
    ]
}

fn timestamps() -> [FieldDescriptor; 2] {
    [
        FieldDescriptor::date("created_at").ignore_patch(),
        FieldDescriptor::date("updated_at").ignore_patch(),
    ]
}

/// Fields shared by every object with a draft/published variant lifecycle.
pub fn versioned_fields() -> Vec<FieldDescriptor> {
    let mut fields = vec![FieldDescriptor::text("id").ignore_patch()];
    fields.extend(name_fields());
    fields.extend([
        FieldDescriptor::text("description").rule(Rule::NoInvisibleCharacters),
        FieldDescriptor::text("active_variant").rule(Rule::Required),
        FieldDescriptor::component("variants"),
        FieldDescriptor::boolean("is_public"),
    ]);
    fields.extend(timestamps());
    fields
}

fn versioned(name: &str, service: &str, endpoint: &str, url_key: &str) -> EntityDescriptor {
    EntityDescriptor::new(name, service, endpoint, KeyField::new("id", url_key))
        .with_fields(versioned_fields())
        .with_pagination(Pagination::new(1, 20).sorted_by("updated_at", true))
}

fn datasources(service: &str) -> EntityDescriptor {
    let source = FieldDescriptor::text("source")
        .rule(Rule::Required)
        .when(
            "sql",
            vec![
                FieldDescriptor::text("host"),
                FieldDescriptor::text("database"),
                FieldDescriptor::text("table"),
            ],
        )
        .when(
            "s3",
            vec![FieldDescriptor::text("bucket"), FieldDescriptor::text("prefix")],
        )
        .when("web", vec![FieldDescriptor::text("url")]);

    let mut fields = vec![FieldDescriptor::text("id").ignore_patch()];
    fields.extend(name_fields());
    fields.extend([
        FieldDescriptor::text("description"),
        source,
        FieldDescriptor::boolean("enabled"),
        FieldDescriptor::date("last_indexed_at").ignore_patch(),
    ]);
    fields.extend(timestamps());

    EntityDescriptor::new(
        "datasources",
        service,
        "datasources",
        KeyField::new("id", "datasourceId"),
    )
    .with_fields(fields)
    .with_pagination(Pagination::new(1, 20).sorted_by("name", false))
    .with_capabilities(Capabilities {
        refresh: true,
        ..Capabilities::default()
    })
}

/// Read-only audit trail of prompt revisions.
fn prompt_history(service: &str) -> EntityDescriptor {
    EntityDescriptor::new(
        "prompt_history",
        service,
        "prompts/history",
        KeyField::new("revision", "revision"),
    )
    .with_fields(vec![
        FieldDescriptor::text("revision"),
        FieldDescriptor::text("prompt_id"),
        FieldDescriptor::text("author"),
        FieldDescriptor::component("snapshot"),
        FieldDescriptor::date("created_at"),
    ])
    .with_pagination(Pagination::new(1, 50).sorted_by("created_at", true))
    .with_capabilities(Capabilities {
        paginated: true,
        detail: false,
        refresh: false,
        read_only: true,
    })
}
