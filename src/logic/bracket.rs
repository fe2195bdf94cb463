use itertools::Itertools;
use serde_json::Value;

use crate::model::{scalar_text, Clause, FilterNode, Group};

/// Compile a filter tree into the legacy `[field] OP 'value'` search expression.
pub fn compile_bracket(node: &FilterNode) -> String {
    match node {
        FilterNode::Clause(clause) => compile_clause(clause),
        FilterNode::Group(group) => compile_group(group),
    }
}

fn compile_clause(clause: &Clause) -> String {
    if clause.op.is_null_check() {
        return format!("[{}] {}", clause.field, clause.op.as_str());
    }
    let separator = format!(" {} ", clause.effective_concatenator().as_str());
    clause
        .options
        .iter()
        .map(|option| format!("[{}] {} {}", clause.field, clause.op.as_str(), quote(option)))
        .join(&separator)
}

fn compile_group(group: &Group) -> String {
    let mut parts: Vec<(String, bool)> = group
        .exp
        .iter()
        .map(|node| (compile_bracket(node), is_compound_clause(node)))
        .filter(|(part, _)| !part.is_empty())
        .collect();
    parts.dedup_by(|a, b| a.0 == b.0);

    match parts.len() {
        0 => String::new(),
        1 => parts.remove(0).0,
        _ => {
            // Joined options bind inside their clause, not across the group
            let separator = format!(" {} ", group.op.as_str());
            let joined = parts
                .into_iter()
                .map(|(part, compound)| if compound { format!("({})", part) } else { part })
                .join(&separator);
            format!("({})", joined)
        }
    }
}

/// A clause that renders as several joined conditions.
fn is_compound_clause(node: &FilterNode) -> bool {
    matches!(node, FilterNode::Clause(clause) if !clause.op.is_null_check() && clause.options.len() > 1)
}

/// Single-quoted literal; embedded quotes are doubled.
fn quote(value: &Value) -> String {
    format!("'{}'", scalar_text(value).replace('\'', "''"))
}
