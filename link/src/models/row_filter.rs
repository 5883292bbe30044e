use std::fmt;

use serde_json::Value as JsonValue;

/// Comparison usable in realtime bindings and REST filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
        }
    }
}

/// Single-column row filter, rendered as `column=op.value`.
///
/// ```rust
/// use venered_link::RowFilter;
///
/// let filter = RowFilter::eq("receiver_id", "42");
/// assert_eq!(filter.to_string(), "receiver_id=eq.42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.to_string(),
        }
    }

    pub fn neq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Neq,
            value: value.to_string(),
        }
    }

    /// Evaluate against a JSON row image with SQL null semantics: a missing
    /// or null column matches neither `eq` nor `neq`.
    pub fn matches(&self, row: &JsonValue) -> bool {
        match row.get(&self.column).and_then(json_text) {
            None => false,
            Some(actual) => match self.op {
                FilterOp::Eq => actual == self.value,
                FilterOp::Neq => actual != self.value,
            },
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.column, self.op.as_str(), self.value)
    }
}

/// Text form of a scalar JSON value, the way PostgREST compares it.
pub(crate) fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}
