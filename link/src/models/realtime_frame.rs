use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::change_event::ChangeKind;

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const SYSTEM: &str = "system";
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Phoenix channel frame (serializer vsn 1.0.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: JsonValue,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixFrame {
    pub fn join(topic: &str, config: JsonValue, access_token: &str, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: PHX_JOIN.to_string(),
            payload: json!({ "config": config, "access_token": access_token }),
            join_ref: Some(reference.clone()),
            reference: Some(reference),
        }
    }

    pub fn leave(topic: &str, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: PHX_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference),
            join_ref: None,
        }
    }

    pub fn heartbeat(reference: String) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference),
            join_ref: None,
        }
    }

    /// Decode a `phx_reply` payload.
    pub fn reply(&self) -> Option<ReplyPayload> {
        if self.event != PHX_REPLY {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplyPayload {
    pub status: String,
    #[serde(default)]
    pub response: JsonValue,
}

impl ReplyPayload {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Best-effort human message from an error reply.
    pub fn reason(&self) -> String {
        self.response
            .get("reason")
            .or_else(|| self.response.get("message"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.response.to_string())
    }
}

/// `payload` of a `postgres_changes` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostgresChangesPayload {
    pub data: PostgresChangeData,
    #[serde(default)]
    pub ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostgresChangeData {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    #[serde(default)]
    pub record: JsonValue,
    #[serde(default)]
    pub old_record: JsonValue,
}
