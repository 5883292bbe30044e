use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::row_filter::json_text;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// A row change delivered on a channel.
///
/// `record` is the new image (null for deletes) and `old_record` the old
/// image, which may carry only the primary key depending on the table's
/// replica identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub channel: String,
    pub table: String,
    pub kind: ChangeKind,
    pub commit_timestamp: Option<String>,
    pub record: JsonValue,
    pub old_record: JsonValue,
}

impl ChangeEvent {
    /// Primary key of the affected row, from whichever image carries it.
    pub fn row_id(&self) -> Option<String> {
        self.record
            .get("id")
            .and_then(json_text)
            .or_else(|| self.old_record.get("id").and_then(json_text))
    }

    /// Key used to drop duplicate deliveries: `type:table:commit_timestamp:row_id`.
    ///
    /// Events with neither a commit timestamp nor a row id cannot be
    /// deduplicated and return `None`.
    pub fn event_key(&self) -> Option<String> {
        let row_id = self.row_id();
        if self.commit_timestamp.is_none() && row_id.is_none() {
            return None;
        }
        Some(format!(
            "{}:{}:{}:{}",
            self.kind.as_str(),
            self.table,
            self.commit_timestamp.as_deref().unwrap_or(""),
            row_id.as_deref().unwrap_or("")
        ))
    }

    /// Decode the new row image.
    pub fn new_row<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.record.clone())?)
    }

    /// Decode the old row image.
    pub fn old_row<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.old_record.clone())?)
    }
}

/// Items yielded by a [`crate::Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// The channel join was acknowledged. `rejoin` is set after a reconnect,
    /// when events may have been missed and state should be re-seeded.
    Subscribed { channel: String, rejoin: bool },

    /// A matching row change.
    Change(ChangeEvent),
}
