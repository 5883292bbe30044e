use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::change_event::ChangeKind;
use super::row_filter::RowFilter;
use super::table::Table;

/// Which change kinds a binding listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSelector {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

impl EventSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSelector::Insert => "INSERT",
            EventSelector::Update => "UPDATE",
            EventSelector::Delete => "DELETE",
            EventSelector::All => "*",
        }
    }

    pub fn accepts(&self, kind: ChangeKind) -> bool {
        match self {
            EventSelector::All => true,
            EventSelector::Insert => kind == ChangeKind::Insert,
            EventSelector::Update => kind == ChangeKind::Update,
            EventSelector::Delete => kind == ChangeKind::Delete,
        }
    }
}

/// One `postgres_changes` binding of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBinding {
    pub events: EventSelector,
    pub table: Table,
    pub filter: Option<RowFilter>,
}

impl ChangeBinding {
    /// True when a change of `kind` on `table` with the given row images
    /// falls inside this binding.
    pub fn matches(
        &self,
        table: &str,
        kind: ChangeKind,
        record: &JsonValue,
        old_record: &JsonValue,
    ) -> bool {
        if self.table.as_str() != table || !self.events.accepts(kind) {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => {
                let image = if kind == ChangeKind::Delete { old_record } else { record };
                filter.matches(image)
            },
        }
    }

    fn to_config(&self) -> JsonValue {
        let mut config = json!({
            "event": self.events.as_str(),
            "schema": "public",
            "table": self.table.as_str(),
        });
        if let Some(filter) = &self.filter {
            config["filter"] = JsonValue::String(filter.to_string());
        }
        config
    }
}

/// A named realtime channel and its bindings.
///
/// ```rust
/// use venered_link::{ChannelSpec, EventSelector, RowFilter, Table};
///
/// let spec = ChannelSpec::new("unread-messages")
///     .on(EventSelector::Insert, Table::Messages, Some(RowFilter::eq("receiver_id", "u1")))
///     .on(EventSelector::Update, Table::Messages, Some(RowFilter::eq("receiver_id", "u1")));
/// assert_eq!(spec.topic(), "realtime:unread-messages");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub bindings: Vec<ChangeBinding>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn on(mut self, events: EventSelector, table: Table, filter: Option<RowFilter>) -> Self {
        self.bindings.push(ChangeBinding {
            events,
            table,
            filter,
        });
        self
    }

    /// Phoenix topic for this channel.
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.name)
    }

    pub fn matches(
        &self,
        table: &str,
        kind: ChangeKind,
        record: &JsonValue,
        old_record: &JsonValue,
    ) -> bool {
        self.bindings.iter().any(|b| b.matches(table, kind, record, old_record))
    }

    /// `config` block of the `phx_join` payload.
    pub fn join_config(&self) -> JsonValue {
        let changes: Vec<JsonValue> = self.bindings.iter().map(ChangeBinding::to_config).collect();
        json!({
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
        })
    }
}
