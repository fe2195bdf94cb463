use regex::Regex;
use std::sync::OnceLock;

use crate::error::SyncError;
use crate::model::{FieldDescriptor, FieldValue, Record, Rule};

fn system_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid system name pattern"))
}

fn invisible_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Zero-width characters, word joiner, BOM, soft hyphen, and control characters except \t \n \r
    PATTERN.get_or_init(|| {
        Regex::new(r"[\x{200B}-\x{200D}\x{2060}\x{FEFF}\x{00AD}\x00-\x08\x0B\x0C\x0E-\x1F\x7F]")
            .expect("valid invisible character pattern")
    })
}

impl Rule {
    /// Check a value. Returns the user-facing message when the rule fails.
    pub fn check(&self, value: Option<&FieldValue>) -> Result<(), String> {
        let text = value.and_then(FieldValue::as_str);
        match self {
            Rule::Required => match value {
                Some(v) if !v.is_blank() => Ok(()),
                _ => Err("This field is required".to_string()),
            },
            // Length rules only apply to text that is present
            Rule::MinLength(min) => match text {
                Some(s) if s.chars().count() < *min => {
                    Err(format!("Must be at least {} characters", min))
                }
                _ => Ok(()),
            },
            Rule::SystemName => match text {
                Some(s) if !s.is_empty() && !system_name_pattern().is_match(s) => Err(
                    "Must start with a letter and contain only letters, digits, '_' or '-'"
                        .to_string(),
                ),
                _ => Ok(()),
            },
            Rule::NoInvisibleCharacters => match text {
                Some(s) if invisible_pattern().is_match(s) => {
                    Err("Must not contain invisible characters".to_string())
                }
                _ => Ok(()),
            },
        }
    }
}

/// Check every rule of every descriptor against the record.
pub fn validate_record(record: &Record, fields: &[FieldDescriptor]) -> Vec<SyncError> {
    let mut violations = Vec::new();
    for field in fields {
        for rule in &field.rules {
            if let Err(message) = rule.check(record.get(&field.name)) {
                violations.push(SyncError::Validation {
                    field: field.name.clone(),
                    message,
                });
            }
        }
    }
    violations
}
