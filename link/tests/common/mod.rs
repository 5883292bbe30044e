#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Instant};
use uuid::Uuid;
use venered_link::{AuthContext, EventHandlers, MemoryBackend, Session, Table};

pub const WAIT: Duration = Duration::from_secs(5);

/// A fresh user and an in-memory session for them.
pub fn session(memory: &MemoryBackend) -> Session {
    session_with(memory, EventHandlers::new())
}

pub fn session_with(memory: &MemoryBackend, handlers: EventHandlers) -> Session {
    let auth = AuthContext::new(Uuid::new_v4(), "test-token").with_email("user@example.com");
    Session::in_memory(auth, memory.clone(), handlers)
}

pub fn message_to(receiver: Uuid, read: bool) -> JsonValue {
    json!({
        "sender_id": Uuid::new_v4(),
        "receiver_id": receiver,
        "content": "hello",
        "read": read,
    })
}

pub fn notification_for(user: Uuid, kind: &str) -> JsonValue {
    json!({
        "user_id": user,
        "type": kind,
        "title": format!("new {}", kind),
        "message": "someone did something",
        "read": false,
    })
}

pub fn seed(memory: &MemoryBackend, table: Table, rows: Vec<JsonValue>) -> Vec<JsonValue> {
    memory.seed_rows(table, rows).expect("seed rows")
}

pub fn row_uuid(row: &JsonValue) -> Uuid {
    Uuid::parse_str(row["id"].as_str().expect("id column")).expect("uuid id")
}

/// Poll `check` until it holds, failing the test after [`WAIT`].
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Let background drain tasks run for a moment.
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}
