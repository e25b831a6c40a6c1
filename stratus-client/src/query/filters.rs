//! Field predicates and their wire parameter form

use serde_json::Value;

/// Comparison operators supported by the datastore's query string syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
    NotIn,
    IsNull,
}

impl Operator {
    /// The bracketed suffix appended to the field name; equality has none.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Operator::Equal => None,
            Operator::NotEqual => Some("ne"),
            Operator::LessThan => Some("lt"),
            Operator::LessThanOrEqual => Some("lte"),
            Operator::GreaterThan => Some("gt"),
            Operator::GreaterThanOrEqual => Some("gte"),
            Operator::In => Some("in"),
            Operator::NotIn => Some("nin"),
            Operator::IsNull => Some("null"),
        }
    }
}

/// A single field predicate. Multiple predicates on the same field stay as
/// separate parameters; the datastore treats repeated keys as conjunctions.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Unencoded `key=value` pair for the query string.
    pub fn to_param(&self) -> (String, String) {
        let key = match self.operator.suffix() {
            Some(suffix) => format!("{}[{suffix}]", self.field),
            None => self.field.clone(),
        };
        (key, render_value(&self.value))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
