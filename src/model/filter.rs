use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a filter clause, in its legacy query spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterOp {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "LIKE",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
        }
    }

    /// Null checks take no operand.
    pub fn is_null_check(&self) -> bool {
        matches!(self, FilterOp::IsNull | FilterOp::IsNotNull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Concatenator {
    And,
    Or,
}

impl Concatenator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Concatenator::And => "AND",
            Concatenator::Or => "OR",
        }
    }
}

/// A single field condition. Multiple options are joined by the concatenator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub field: String,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default)]
    pub op: FilterOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concatenator: Option<Concatenator>,
}

impl Clause {
    pub fn new(field: &str, op: FilterOp, options: Vec<Value>) -> Self {
        Self {
            field: field.to_string(),
            options,
            op,
            concatenator: None,
        }
    }

    pub fn eq(field: &str, options: Vec<Value>) -> Self {
        Self::new(field, FilterOp::Eq, options)
    }

    pub fn with_concatenator(mut self, concatenator: Concatenator) -> Self {
        self.concatenator = Some(concatenator);
        self
    }

    /// Explicit concatenator, else AND for `<>` and OR for everything else.
    pub fn effective_concatenator(&self) -> Concatenator {
        match self.concatenator {
            Some(concatenator) => concatenator,
            None if self.op == FilterOp::Ne => Concatenator::And,
            None => Concatenator::Or,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub op: Concatenator,
    pub exp: Vec<FilterNode>,
}

/// Boolean filter expression tree shared by the query compilers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    // Group must be tried first: it is the only shape with `exp`
    Group(Group),
    Clause(Clause),
}

impl FilterNode {
    pub fn all(exp: Vec<FilterNode>) -> Self {
        FilterNode::Group(Group {
            op: Concatenator::And,
            exp,
        })
    }

    pub fn any(exp: Vec<FilterNode>) -> Self {
        FilterNode::Group(Group {
            op: Concatenator::Or,
            exp,
        })
    }
}

impl From<Clause> for FilterNode {
    fn from(clause: Clause) -> Self {
        FilterNode::Clause(clause)
    }
}
