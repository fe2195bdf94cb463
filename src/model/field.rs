use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic type of a field. Decides how values are decoded from and encoded for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FieldKind {
    String,
    Date,
    Boolean,
    /// Structured value owned by a custom editor; passed through untouched.
    Component,
}

/// Client-side validation rule attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Required,
    MinLength(usize),
    /// Identifier usable as a system name: a letter followed by letters, digits, `_` or `-`.
    SystemName,
    NoInvisibleCharacters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    /// Excluded from outgoing patches (server-managed fields such as timestamps).
    #[serde(default)]
    pub ignore_patch: bool,
    /// Sub-fields selected by this field's own value (discriminated union).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Vec<FieldDescriptor>>,
}

impl FieldDescriptor {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            rules: Vec::new(),
            ignore_patch: false,
            children: BTreeMap::new(),
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn component(name: &str) -> Self {
        Self::new(name, FieldKind::Component)
    }

    pub fn ignore_patch(mut self) -> Self {
        self.ignore_patch = true;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Declare the sub-fields that apply when this field holds `value`.
    pub fn when(mut self, value: &str, children: Vec<FieldDescriptor>) -> Self {
        self.children.insert(value.to_string(), children);
        self
    }

    pub fn children_for(&self, value: &str) -> Option<&[FieldDescriptor]> {
        self.children.get(value).map(|c| c.as_slice())
    }
}

/// Look up a descriptor by name, including sub-fields of discriminated unions.
pub fn find_field<'a>(fields: &'a [FieldDescriptor], name: &str) -> Option<&'a FieldDescriptor> {
    for field in fields {
        if field.name == name {
            return Some(field);
        }
    }
    fields
        .iter()
        .flat_map(|f| f.children.values())
        .find_map(|children| find_field(children, name))
}
