//! Row selection builder shared by every [`Backend`](crate::Backend).
//!
//! A [`TableQuery`] renders to PostgREST query pairs for the HTTP backend
//! and evaluates directly against JSON rows for the in-memory backend, so
//! both sides agree on what a filter means.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use crate::models::row_filter::json_text;
use crate::models::Table;

/// A single row predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    In(String, Vec<String>),
    /// Disjunction of conjunctions of equalities: `or=(and(a.eq.1,b.eq.2),and(..))`.
    AnyOf(Vec<Vec<(String, String)>>),
    /// Any of the columns contains the term, ignoring case: `or=(a.ilike.*t*,b.ilike.*t*)`.
    Contains(Vec<String>, String),
}

impl Filter {
    fn to_pair(&self) -> (String, String) {
        match self {
            Filter::Eq(col, value) => (col.clone(), format!("eq.{}", value)),
            Filter::Neq(col, value) => (col.clone(), format!("neq.{}", value)),
            Filter::In(col, values) => (col.clone(), format!("in.({})", values.join(","))),
            Filter::AnyOf(groups) => {
                let rendered: Vec<String> = groups
                    .iter()
                    .map(|group| {
                        let terms: Vec<String> = group
                            .iter()
                            .map(|(col, value)| format!("{}.eq.{}", col, value))
                            .collect();
                        format!("and({})", terms.join(","))
                    })
                    .collect();
                ("or".to_string(), format!("({})", rendered.join(",")))
            },
            Filter::Contains(cols, term) => {
                let rendered: Vec<String> = cols
                    .iter()
                    .map(|col| format!("{}.ilike.*{}*", col, term))
                    .collect();
                ("or".to_string(), format!("({})", rendered.join(",")))
            },
        }
    }

    /// SQL semantics: null or missing columns match nothing.
    fn matches(&self, row: &JsonValue) -> bool {
        let text = |col: &str| row.get(col).and_then(json_text);
        match self {
            Filter::Eq(col, value) => text(col).as_deref() == Some(value.as_str()),
            Filter::Neq(col, value) => text(col).map_or(false, |actual| &actual != value),
            Filter::In(col, values) => text(col).map_or(false, |actual| values.contains(&actual)),
            Filter::AnyOf(groups) => groups.iter().any(|group| {
                group
                    .iter()
                    .all(|(col, value)| text(col).as_deref() == Some(value.as_str()))
            }),
            Filter::Contains(cols, term) => {
                let term = term.to_lowercase();
                cols.iter()
                    .filter_map(|col| text(col))
                    .any(|actual| actual.to_lowercase().contains(&term))
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Selection of rows in one table.
///
/// ```rust
/// use venered_link::{Table, TableQuery};
///
/// let query = TableQuery::new(Table::Notifications)
///     .eq("user_id", "u1")
///     .neq("type", "message")
///     .order("created_at", false)
///     .limit(50);
/// assert!(query.to_query_pairs().contains(&("limit".into(), "50".into())));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub table: Table,
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl TableQuery {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Restrict the returned columns. Empty means `*`.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.to_string()));
        self
    }

    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }

    /// Rows where `(a = x AND b = y) OR (a = y AND b = x)`, the two-party
    /// conversation filter.
    pub fn or_pair(mut self, a: &str, b: &str, x: impl ToString, y: impl ToString) -> Self {
        let (x, y) = (x.to_string(), y.to_string());
        self.filters.push(Filter::AnyOf(vec![
            vec![(a.to_string(), x.clone()), (b.to_string(), y.clone())],
            vec![(a.to_string(), y), (b.to_string(), x)],
        ]));
        self
    }

    /// Rows where any of `columns` contains `term`, ignoring case.
    ///
    /// Characters that carry meaning inside a PostgREST `or=(..)` list are
    /// stripped from the term.
    pub fn contains(mut self, columns: &[&str], term: &str) -> Self {
        let term: String = term
            .chars()
            .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '.' | ':'))
            .collect();
        self.filters.push(Filter::Contains(
            columns.iter().map(|c| c.to_string()).collect(),
            term.trim().to_string(),
        ));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PostgREST query string pairs.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 3);
        if !self.columns.is_empty() {
            pairs.push(("select".to_string(), self.columns.join(",")));
        }
        pairs.extend(self.filters.iter().map(Filter::to_pair));
        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    /// True when every filter accepts `row`.
    pub fn matches(&self, row: &JsonValue) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Apply filters, ordering, limit and projection to `rows`.
    pub fn apply<'a, I>(&self, rows: I) -> Vec<JsonValue>
    where
        I: IntoIterator<Item = &'a JsonValue>,
    {
        let mut selected: Vec<&JsonValue> = rows.into_iter().filter(|r| self.matches(r)).collect();
        if let Some(order) = &self.order {
            selected.sort_by(|a, b| {
                let ord = compare_json(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected.into_iter().map(|row| self.project(row)).collect()
    }

    fn project(&self, row: &JsonValue) -> JsonValue {
        if self.columns.is_empty() {
            return row.clone();
        }
        let mut out = serde_json::Map::new();
        for col in &self.columns {
            if let Some(value) = row.get(col) {
                out.insert(col.clone(), value.clone());
            }
        }
        JsonValue::Object(out)
    }
}

/// Nulls sort last in ascending order, like Postgres.
fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => json_text(x).cmp(&json_text(y)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_rendering() {
        let query = TableQuery::new(Table::Notifications)
            .columns(&["id", "read"])
            .eq("user_id", "u1")
            .eq("read", false)
            .neq("type", "message")
            .is_in("id", ["a", "b"])
            .order("created_at", false)
            .limit(50);

        assert_eq!(
            query.to_query_pairs(),
            vec![
                ("select".to_string(), "id,read".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                ("read".to_string(), "eq.false".to_string()),
                ("type".to_string(), "neq.message".to_string()),
                ("id".to_string(), "in.(a,b)".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_or_pair_rendering() {
        let query = TableQuery::new(Table::Messages).or_pair("sender_id", "receiver_id", "me", "you");
        assert_eq!(
            query.to_query_pairs(),
            vec![(
                "or".to_string(),
                "(and(sender_id.eq.me,receiver_id.eq.you),and(sender_id.eq.you,receiver_id.eq.me))"
                    .to_string()
            )]
        );
    }

    #[test]
    fn test_apply_filters_orders_and_limits() {
        let rows = vec![
            json!({"id": "1", "user_id": "u1", "type": "like", "read": false, "created_at": "2024-01-01T00:00:01Z"}),
            json!({"id": "2", "user_id": "u1", "type": "message", "read": false, "created_at": "2024-01-01T00:00:02Z"}),
            json!({"id": "3", "user_id": "u2", "type": "like", "read": false, "created_at": "2024-01-01T00:00:03Z"}),
            json!({"id": "4", "user_id": "u1", "type": "follow", "read": false, "created_at": "2024-01-01T00:00:04Z"}),
            json!({"id": "5", "user_id": "u1", "type": null, "read": false, "created_at": "2024-01-01T00:00:05Z"}),
        ];
        let query = TableQuery::new(Table::Notifications)
            .eq("user_id", "u1")
            .neq("type", "message")
            .order("created_at", false)
            .limit(5);

        let ids: Vec<_> = query.apply(&rows).iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("4"), json!("1")]);
    }

    #[test]
    fn test_or_pair_matches_both_directions() {
        let query = TableQuery::new(Table::Messages).or_pair("sender_id", "receiver_id", "a", "b");
        assert!(query.matches(&json!({"sender_id": "a", "receiver_id": "b"})));
        assert!(query.matches(&json!({"sender_id": "b", "receiver_id": "a"})));
        assert!(!query.matches(&json!({"sender_id": "a", "receiver_id": "c"})));
    }

    #[test]
    fn test_contains_renders_and_matches_case_insensitively() {
        let query = TableQuery::new(Table::Profiles).contains(&["username", "full_name"], "An(a),");
        assert_eq!(
            query.to_query_pairs(),
            vec![(
                "or".to_string(),
                "(username.ilike.*Ana*,full_name.ilike.*Ana*)".to_string()
            )]
        );
        assert!(query.matches(&json!({"username": "banana", "full_name": null})));
        assert!(query.matches(&json!({"username": "zed", "full_name": "Mariana Ruiz"})));
        assert!(!query.matches(&json!({"username": "zed", "full_name": "Bob"})));
    }

    #[test]
    fn test_projection() {
        let rows = vec![json!({"id": "1", "username": "ana", "bio": "x"})];
        let out = TableQuery::new(Table::Profiles).columns(&["id", "username"]).apply(&rows);
        assert_eq!(out, vec![json!({"id": "1", "username": "ana"})]);
    }
}
