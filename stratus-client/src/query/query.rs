//! Fluent query construction and its wire translation
//!
//! A [`Query`] collects filters, sort directives, a pagination window and
//! optional expansion/projection, then translates them into wire query
//! parameters. Translation is pure and deterministic: repeated calls on the
//! same query yield identical output, and parameter order follows
//! declaration order.

use serde_json::{Value, json};

use crate::error::Error;
use crate::options::MAX_EXPAND_DEPTH;
use crate::query::filters::{Filter, Operator};
use crate::query::orderby::OrderBy;

/// Wire parameter name carrying the joined sort directives.
const ORDER_PARAM: &str = "order";

/// A query against a single schema.
#[derive(Debug, Clone, Default)]
pub struct Query {
    schema: String,
    filters: Vec<Filter>,
    order: Vec<OrderBy>,
    offset: Option<u64>,
    limit: Option<u64>,
    expand_depth: u8,
    fields: Vec<String>,
}

impl Query {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            ..Self::default()
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: Value) -> Self {
        self.filter(Filter::new(field, Operator::Equal, value))
    }

    pub fn where_ne(self, field: impl Into<String>, value: Value) -> Self {
        self.filter(Filter::new(field, Operator::NotEqual, value))
    }

    pub fn where_lt(self, field: impl Into<String>, value: Value) -> Self {
        self.filter(Filter::new(field, Operator::LessThan, value))
    }

    pub fn where_lte(self, field: impl Into<String>, value: Value) -> Self {
        self.filter(Filter::new(field, Operator::LessThanOrEqual, value))
    }

    pub fn where_gt(self, field: impl Into<String>, value: Value) -> Self {
        self.filter(Filter::new(field, Operator::GreaterThan, value))
    }

    pub fn where_gte(self, field: impl Into<String>, value: Value) -> Self {
        self.filter(Filter::new(field, Operator::GreaterThanOrEqual, value))
    }

    pub fn where_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Filter::new(field, Operator::In, Value::Array(values)))
    }

    pub fn where_not_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Filter::new(field, Operator::NotIn, Value::Array(values)))
    }

    pub fn where_null(self, field: impl Into<String>, is_null: bool) -> Self {
        self.filter(Filter::new(field, Operator::IsNull, json!(is_null)))
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order.push(OrderBy::asc(field));
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order.push(OrderBy::desc(field));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Cap the result window. A zero limit is rejected: the wire range is
    /// inclusive on both ends, so no window can request zero objects.
    pub fn limit(mut self, limit: u64) -> Result<Self, Error> {
        if limit == 0 {
            return Err(Error::InvalidOption {
                reason: "limit must be at least 1".to_string(),
            });
        }
        self.limit = Some(limit);
        Ok(self)
    }

    /// Inline related objects up to `depth` relationship hops.
    pub fn expand_depth(mut self, depth: u8) -> Result<Self, Error> {
        if depth > MAX_EXPAND_DEPTH {
            return Err(Error::InvalidOption {
                reason: format!("expand depth {depth} exceeds maximum {MAX_EXPAND_DEPTH}"),
            });
        }
        self.expand_depth = depth;
        Ok(self)
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn expansion_depth(&self) -> u8 {
        self.expand_depth
    }

    pub fn field_projection(&self) -> &[String] {
        &self.fields
    }

    /// Ordered, unencoded wire parameters: one per predicate in declaration
    /// order, then the joined sort directives. Repeated fields stay
    /// separate; the datastore treats them as conjunctions.
    pub fn to_wire_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> =
            self.filters.iter().map(Filter::to_param).collect();
        if !self.order.is_empty() {
            let joined = self
                .order
                .iter()
                .map(OrderBy::to_segment)
                .collect::<Vec<_>>()
                .join(",");
            params.push((ORDER_PARAM.to_string(), joined));
        }
        params
    }

    /// URL-encoded query string form of [`Self::to_wire_params`].
    pub fn query_string(&self) -> String {
        self.to_wire_params()
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Pagination serializes as a `Range` header, not a query parameter.
    /// `objects=<offset>-<end>` for a bounded window, `objects=<offset>-`
    /// when only an offset is set. No window means no header.
    pub fn range_header(&self) -> Option<String> {
        match (self.offset, self.limit) {
            (None, None) => None,
            (offset, limit) => {
                let start = offset.unwrap_or(0);
                Some(match limit {
                    Some(limit) => {
                        format!("objects={start}-{}", start.saturating_add(limit - 1))
                    }
                    None => format!("objects={start}-"),
                })
            }
        }
    }
}
