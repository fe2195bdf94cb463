use itertools::Itertools;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

use crate::logic::deep_equal::deep_equal;
use crate::model::{record_to_json, scalar_text, Clause, Concatenator, FilterNode, FilterOp, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    StrictEq,
    StrictNe,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn from_filter(op: FilterOp) -> Option<Self> {
        match op {
            FilterOp::Eq => Some(CompareOp::StrictEq),
            FilterOp::Ne => Some(CompareOp::StrictNe),
            FilterOp::Gt => Some(CompareOp::Gt),
            FilterOp::Gte => Some(CompareOp::Gte),
            FilterOp::Lt => Some(CompareOp::Lt),
            FilterOp::Lte => Some(CompareOp::Lte),
            FilterOp::Like | FilterOp::IsNull | FilterOp::IsNotNull => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            CompareOp::StrictEq => "===",
            CompareOp::StrictNe => "!==",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// In-memory filter compiled from a filter tree.
///
/// Evaluated directly with [`Predicate::matches`]; `Display` renders the legacy predicate text.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// No constraint (empty clause or group).
    Always,
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    OneOf {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// Missing, `null` or empty string.
    Blank { field: String, negated: bool },
    /// Anchored, case-insensitive wildcard match; `source` is the pattern body.
    Like {
        field: String,
        source: String,
        pattern: Regex,
    },
}

/// Compile a filter tree into a predicate.
pub fn compile_predicate(node: &FilterNode) -> Predicate {
    match node {
        FilterNode::Clause(clause) => compile_clause(clause),
        FilterNode::Group(group) => {
            let mut parts: Vec<Predicate> = group
                .exp
                .iter()
                .map(compile_predicate)
                .filter(|p| !matches!(p, Predicate::Always))
                .collect();
            parts.dedup_by(|a, b| a.to_string() == b.to_string());
            join(parts, group.op)
        }
    }
}

fn compile_clause(clause: &Clause) -> Predicate {
    let field = clause.field.clone();
    match clause.op {
        FilterOp::IsNull => return Predicate::Blank { field, negated: false },
        FilterOp::IsNotNull => return Predicate::Blank { field, negated: true },
        _ => {}
    }
    if clause.options.is_empty() {
        return Predicate::Always;
    }

    let concatenator = clause.effective_concatenator();
    match (clause.op, CompareOp::from_filter(clause.op)) {
        (FilterOp::Like, _) => {
            let parts = clause
                .options
                .iter()
                .filter_map(|option| like(&field, option))
                .collect();
            join(parts, concatenator)
        }
        (FilterOp::Eq | FilterOp::Ne, _) if clause.options.len() > 1 => Predicate::OneOf {
            field,
            values: clause.options.clone(),
            negated: clause.op == FilterOp::Ne,
        },
        (_, Some(op)) => {
            let parts = clause
                .options
                .iter()
                .map(|value| Predicate::Compare {
                    field: field.clone(),
                    op,
                    value: value.clone(),
                })
                .collect();
            join(parts, concatenator)
        }
        (_, None) => Predicate::Always,
    }
}

fn like(field: &str, option: &Value) -> Option<Predicate> {
    let source = scalar_text(option)
        .split('*')
        .map(regex::escape)
        .join(".*");
    let pattern = Regex::new(&format!("(?i)^{}$", source)).ok()?;
    Some(Predicate::Like {
        field: field.to_string(),
        source,
        pattern,
    })
}

fn join(mut parts: Vec<Predicate>, concatenator: Concatenator) -> Predicate {
    match parts.len() {
        0 => Predicate::Always,
        1 => parts.remove(0),
        _ => match concatenator {
            Concatenator::And => Predicate::All(parts),
            Concatenator::Or => Predicate::Any(parts),
        },
    }
}

impl Predicate {
    /// Evaluate against a JSON record. A missing field behaves like `undefined`.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::All(parts) => parts.iter().all(|p| p.matches(record)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(record)),
            Predicate::Compare { field, op, value } => {
                let actual = record.get(field);
                match op {
                    CompareOp::StrictEq => actual.is_some_and(|v| deep_equal(v, value)),
                    CompareOp::StrictNe => !actual.is_some_and(|v| deep_equal(v, value)),
                    CompareOp::Gt => compare_values(actual, value) == Some(Ordering::Greater),
                    CompareOp::Gte => matches!(
                        compare_values(actual, value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CompareOp::Lt => compare_values(actual, value) == Some(Ordering::Less),
                    CompareOp::Lte => matches!(
                        compare_values(actual, value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                }
            }
            Predicate::OneOf {
                field,
                values,
                negated,
            } => {
                let found = record
                    .get(field)
                    .is_some_and(|v| values.iter().any(|candidate| deep_equal(v, candidate)));
                found != *negated
            }
            Predicate::Blank { field, negated } => {
                let blank = match record.get(field) {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.is_empty(),
                    Some(_) => false,
                };
                blank != *negated
            }
            Predicate::Like { field, pattern, .. } => match record.get(field) {
                Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
                    pattern.is_match(&scalar_text(value))
                }
                _ => false,
            },
        }
    }

    pub fn matches_record(&self, record: &Record) -> bool {
        self.matches(&record_to_json(record))
    }
}

/// Order two values: numbers numerically, strings lexically, numeric strings against numbers.
fn compare_values(left: Option<&Value>, right: &Value) -> Option<Ordering> {
    match (left?, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Number(l), Value::String(r)) => l.as_f64()?.partial_cmp(&r.parse::<f64>().ok()?),
        (Value::String(l), Value::Number(r)) => l.parse::<f64>().ok()?.partial_cmp(&r.as_f64()?),
        _ => None,
    }
}

fn accessor(field: &str) -> String {
    format!("item['{}']", escape_single(field))
}

fn escape_single(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", escape_single(s)),
        other => other.to_string(),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Predicate::Always => Ok(()),
            Predicate::All(parts) => write!(f, "({})", parts.iter().join(" && ")),
            Predicate::Any(parts) => write!(f, "({})", parts.iter().join(" || ")),
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} {}", accessor(field), op.as_str(), literal(value))
            }
            Predicate::OneOf {
                field,
                values,
                negated,
            } => write!(
                f,
                "{}[{}].includes({})",
                if *negated { "!" } else { "" },
                values.iter().map(literal).join(","),
                accessor(field)
            ),
            Predicate::Blank { field, negated } => write!(
                f,
                "{}[undefined, null, ''].includes({})",
                if *negated { "!" } else { "" },
                accessor(field)
            ),
            Predicate::Like { field, source, .. } => {
                write!(f, "/^{}$/i.test({})", source.replace('/', "\\/"), accessor(field))
            }
        }
    }
}

/// Compile the tree to predicate text.
pub fn compile_predicate_text(node: &FilterNode) -> String {
    compile_predicate(node).to_string()
}

/// Keep the records the filter tree accepts.
pub fn filter_records(records: Vec<Record>, node: &FilterNode) -> Vec<Record> {
    let predicate = compile_predicate(node);
    records
        .into_iter()
        .filter(|record| predicate.matches_record(record))
        .collect()
}
