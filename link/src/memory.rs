//! In-process implementation of [`Backend`] and [`Realtime`].
//!
//! Rows live in per-table vectors behind one lock. Every write is published
//! to the channels whose bindings match, stamped with a strictly increasing
//! commit timestamp, the way the hosted backend's change feed behaves. Used
//! by the integration tests and for offline demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{Result, VeneredLinkError};
use crate::models::row_filter::json_text;
use crate::models::{ChangeEvent, ChangeKind, ChannelSpec, RealtimeEvent, Table};
use crate::realtime::{Realtime, Subscription};
use crate::table_query::TableQuery;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_DEDUP_WINDOW: usize = 256;

/// Backend operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Count,
    Insert,
    Upsert,
    Update,
    Delete,
    Rpc,
    Subscribe,
}

struct MemoryChannel {
    spec: ChannelSpec,
    event_tx: mpsc::Sender<Result<RealtimeEvent>>,
    generation: u64,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Table, Vec<JsonValue>>,
    channels: HashMap<String, MemoryChannel>,
    failures: HashMap<Operation, u32>,
    last_commit: Option<DateTime<Utc>>,
    next_generation: u64,
}

impl MemoryState {
    fn take_failure(&mut self, op: Operation) -> bool {
        match self.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            },
            _ => false,
        }
    }

    /// Strictly increasing commit clock.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_commit {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(next);
        next
    }

    fn fill_defaults(&mut self, table: Table, row: &mut JsonValue) -> Result<String> {
        let stamp = self.tick().to_rfc3339_opts(SecondsFormat::Micros, true);
        let object = row.as_object_mut().ok_or_else(|| {
            VeneredLinkError::ValidationError(format!("{} rows must be JSON objects", table))
        })?;
        object
            .entry("id")
            .or_insert_with(|| JsonValue::String(Uuid::new_v4().to_string()));
        object
            .entry("created_at")
            .or_insert_with(|| JsonValue::String(stamp.clone()));
        match table {
            Table::Messages | Table::Notifications => {
                object.entry("read").or_insert(JsonValue::Bool(false));
            },
            Table::BannedUsers => {
                object.entry("is_active").or_insert(JsonValue::Bool(true));
                object
                    .entry("banned_at")
                    .or_insert_with(|| JsonValue::String(stamp.clone()));
            },
            _ => {},
        }
        Ok(stamp)
    }

    fn publish(&self, table: Table, kind: ChangeKind, stamp: &str, record: &JsonValue, old: &JsonValue) {
        for (name, channel) in &self.channels {
            if !channel.spec.matches(table.as_str(), kind, record, old) {
                continue;
            }
            let change = ChangeEvent {
                channel: name.clone(),
                table: table.as_str().to_string(),
                kind,
                commit_timestamp: Some(stamp.to_string()),
                record: record.clone(),
                old_record: old.clone(),
            };
            if channel
                .event_tx
                .try_send(Ok(RealtimeEvent::Change(change)))
                .is_err()
            {
                warn!("[REALTIME] Memory channel '{}' is full or closed, event dropped", name);
            }
        }
    }

    fn insert_row(&mut self, table: Table, mut row: JsonValue) -> Result<JsonValue> {
        let stamp = self.fill_defaults(table, &mut row)?;
        self.tables.entry(table).or_default().push(row.clone());
        self.publish(table, ChangeKind::Insert, &stamp, &row, &JsonValue::Null);
        Ok(row)
    }

    fn update_where(
        &mut self,
        table: Table,
        matches: impl Fn(&JsonValue) -> bool,
        patch: &Map<String, JsonValue>,
    ) -> Vec<JsonValue> {
        let stamp = self.tick().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut changed = Vec::new();
        if let Some(rows) = self.tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|r| matches(r)) {
                let old = row.clone();
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in patch {
                        object.insert(key.clone(), value.clone());
                    }
                }
                changed.push((old, row.clone()));
            }
        }
        for (old, new) in &changed {
            self.publish(table, ChangeKind::Update, &stamp, new, old);
        }
        changed.into_iter().map(|(_, new)| new).collect()
    }

    fn rows(&self, table: Table) -> &[JsonValue] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn injected(op: Operation) -> VeneredLinkError {
    VeneredLinkError::ServerError {
        status_code: 503,
        message: format!("injected {:?} failure", op),
    }
}

fn patch_object(patch: JsonValue) -> Result<Map<String, JsonValue>> {
    match patch {
        JsonValue::Object(map) => Ok(map),
        other => Err(VeneredLinkError::ValidationError(format!(
            "patch must be a JSON object, got {}",
            other
        ))),
    }
}

/// In-memory backend with realtime fan-out and failure injection.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryState>>,
    dedup_window: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState::default())),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: Operation, times: u32) {
        *self.inner.lock().failures.entry(op).or_insert(0) += times;
    }

    /// Store rows without publishing them, filling ids and timestamps.
    pub fn seed_rows(&self, table: Table, rows: Vec<JsonValue>) -> Result<Vec<JsonValue>> {
        let mut state = self.inner.lock();
        rows.into_iter()
            .map(|mut row| {
                state.fill_defaults(table, &mut row)?;
                state.tables.entry(table).or_default().push(row.clone());
                Ok(row)
            })
            .collect()
    }

    /// Snapshot of a table.
    pub fn rows(&self, table: Table) -> Vec<JsonValue> {
        self.inner.lock().rows(table).to_vec()
    }

    /// Names of open channels.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deliver `event` to the named channel as-is, bypassing the tables.
    /// Returns false when no such channel is open.
    pub fn inject(&self, channel: &str, event: RealtimeEvent) -> bool {
        let state = self.inner.lock();
        match state.channels.get(channel) {
            Some(entry) => entry.event_tx.try_send(Ok(event)).is_ok(),
            None => false,
        }
    }

    /// Tell every open channel it was rejoined, as after a reconnect.
    pub fn simulate_rejoin(&self) {
        let state = self.inner.lock();
        for (name, entry) in &state.channels {
            let _ = entry.event_tx.try_send(Ok(RealtimeEvent::Subscribed {
                channel: name.clone(),
                rejoin: true,
            }));
        }
    }

    fn check(&self, op: Operation) -> Result<()> {
        if self.inner.lock().take_failure(op) {
            debug!("[MEMORY] Injected {:?} failure", op);
            return Err(injected(op));
        }
        Ok(())
    }

    fn call_builtin(&self, function: &str, args: &JsonValue) -> Result<JsonValue> {
        let state = self.inner.lock();
        let arg = |name: &str| args.get(name).and_then(json_text).unwrap_or_default();

        match function {
            "is_admin" => {
                let user_id = arg("user_id");
                let admin = state
                    .rows(Table::AdminRoles)
                    .iter()
                    .any(|r| r.get("user_id").and_then(json_text).as_deref() == Some(user_id.as_str()));
                Ok(JsonValue::Bool(admin))
            },
            "check_username_availability" => {
                let wanted = arg("username_to_check").to_lowercase();
                let taken = state.rows(Table::Profiles).iter().any(|r| {
                    r.get("username")
                        .and_then(JsonValue::as_str)
                        .map_or(false, |u| u.to_lowercase() == wanted)
                });
                Ok(JsonValue::Bool(!taken))
            },
            "is_user_banned" => {
                let user_id = arg("user_id");
                let now = Utc::now();
                let banned = state.rows(Table::BannedUsers).iter().any(|r| {
                    r.get("user_id").and_then(json_text).as_deref() == Some(user_id.as_str())
                        && r.get("is_active").and_then(JsonValue::as_bool).unwrap_or(false)
                        && r.get("expires_at")
                            .and_then(JsonValue::as_str)
                            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                            .map_or(true, |expires| expires > now)
                });
                Ok(JsonValue::Bool(banned))
            },
            "get_conversations" => Ok(conversations_for(&state, &arg("p_user_id"))),
            other => Err(VeneredLinkError::ServerError {
                status_code: 404,
                message: format!("Could not find the function public.{}", other),
            }),
        }
    }
}

/// One row per counterpart, newest conversation first.
fn conversations_for(state: &MemoryState, me: &str) -> JsonValue {
    let text = |row: &JsonValue, col: &str| row.get(col).and_then(json_text).unwrap_or_default();
    let mut latest: HashMap<String, &JsonValue> = HashMap::new();
    let mut unread: HashMap<String, u64> = HashMap::new();

    for message in state.rows(Table::Messages) {
        let sender = text(message, "sender_id");
        let receiver = text(message, "receiver_id");
        let other = if sender == me {
            receiver
        } else if receiver == me {
            if !message.get("read").and_then(JsonValue::as_bool).unwrap_or(false) {
                *unread.entry(sender.clone()).or_default() += 1;
            }
            sender
        } else {
            continue;
        };
        let newer = latest
            .get(&other)
            .map_or(true, |current| text(message, "created_at") >= text(*current, "created_at"));
        if newer {
            latest.insert(other, message);
        }
    }

    let mut rows: Vec<JsonValue> = latest
        .into_iter()
        .map(|(other, last)| {
            let profile = state
                .rows(Table::Profiles)
                .iter()
                .find(|p| text(p, "id") == other);
            let is_following = state.rows(Table::Follows).iter().any(|f| {
                text(f, "follower_id") == me
                    && text(f, "following_id") == other
                    && f.get("status").and_then(JsonValue::as_str).unwrap_or("accepted") == "accepted"
            });
            json!({
                "id": other,
                "username": profile.map(|p| text(p, "username")).unwrap_or_default(),
                "full_name": profile.and_then(|p| p.get("full_name").cloned()),
                "avatar_url": profile.and_then(|p| p.get("avatar_url").cloned()),
                "last_message": last.get("content").cloned(),
                "last_message_time": last.get("created_at").cloned(),
                "unread_count": unread.get(&other).copied().unwrap_or(0),
                "is_following": is_following,
            })
        })
        .collect();
    rows.sort_by(|a, b| text(b, "last_message_time").cmp(&text(a, "last_message_time")));
    JsonValue::Array(rows)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, query: &TableQuery) -> Result<Vec<JsonValue>> {
        self.check(Operation::Select)?;
        let state = self.inner.lock();
        Ok(query.apply(state.rows(query.table)))
    }

    async fn count(&self, query: &TableQuery) -> Result<u64> {
        self.check(Operation::Count)?;
        let state = self.inner.lock();
        Ok(state
            .rows(query.table)
            .iter()
            .filter(|r| query.matches(r))
            .count() as u64)
    }

    async fn insert(&self, table: Table, rows: Vec<JsonValue>) -> Result<Vec<JsonValue>> {
        self.check(Operation::Insert)?;
        let mut state = self.inner.lock();
        rows.into_iter().map(|row| state.insert_row(table, row)).collect()
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<JsonValue>,
        on_conflict: &[&str],
    ) -> Result<Vec<JsonValue>> {
        self.check(Operation::Upsert)?;
        let mut state = self.inner.lock();
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let key: Vec<(String, Option<String>)> = on_conflict
                .iter()
                .map(|col| (col.to_string(), row.get(*col).and_then(json_text)))
                .collect();
            let same_key = |existing: &JsonValue| {
                !key.is_empty()
                    && key
                        .iter()
                        .all(|(col, value)| existing.get(col).and_then(json_text) == *value)
            };

            let exists = state.rows(table).iter().any(|r| same_key(r));
            if exists {
                let patch = patch_object(row)?;
                stored.extend(state.update_where(table, same_key, &patch));
            } else {
                stored.push(state.insert_row(table, row)?);
            }
        }
        Ok(stored)
    }

    async fn update(&self, query: &TableQuery, patch: JsonValue) -> Result<Vec<JsonValue>> {
        self.check(Operation::Update)?;
        let patch = patch_object(patch)?;
        let mut state = self.inner.lock();
        Ok(state.update_where(query.table, |r| query.matches(r), &patch))
    }

    async fn delete(&self, query: &TableQuery) -> Result<u64> {
        self.check(Operation::Delete)?;
        let mut state = self.inner.lock();
        let stamp = state.tick().to_rfc3339_opts(SecondsFormat::Micros, true);
        let removed: Vec<JsonValue> = match state.tables.get_mut(&query.table) {
            Some(rows) => {
                let (gone, kept): (Vec<JsonValue>, Vec<JsonValue>) =
                    rows.drain(..).partition(|r| query.matches(r));
                *rows = kept;
                gone
            },
            None => Vec::new(),
        };
        for old in &removed {
            state.publish(query.table, ChangeKind::Delete, &stamp, &JsonValue::Null, old);
        }
        Ok(removed.len() as u64)
    }

    async fn rpc(&self, function: &str, args: JsonValue) -> Result<JsonValue> {
        self.check(Operation::Rpc)?;
        self.call_builtin(function, &args)
    }
}

#[async_trait]
impl Realtime for MemoryBackend {
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription> {
        let mut state = self.inner.lock();
        if state.take_failure(Operation::Subscribe) {
            return Err(VeneredLinkError::ChannelError(format!(
                "injected subscribe failure for '{}'",
                spec.name
            )));
        }
        if state.channels.contains_key(&spec.name) {
            return Err(VeneredLinkError::ChannelError(format!(
                "channel '{}' already exists",
                spec.name
            )));
        }

        let name = spec.name.clone();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let _ = event_tx.try_send(Ok(RealtimeEvent::Subscribed {
            channel: name.clone(),
            rejoin: false,
        }));
        state.next_generation += 1;
        let generation = state.next_generation;
        state.channels.insert(
            name.clone(),
            MemoryChannel {
                spec,
                event_tx,
                generation,
            },
        );
        drop(state);
        debug!("[REALTIME] Memory channel '{}' opened", name);

        let inner = self.inner.clone();
        let channel = name.clone();
        Ok(Subscription::new(
            name,
            event_rx,
            self.dedup_window,
            Box::new(move || {
                let mut state = inner.lock();
                if state.channels.get(&channel).map_or(false, |c| c.generation == generation) {
                    state.channels.remove(&channel);
                    debug!("[REALTIME] Memory channel '{}' released", channel);
                }
            }),
        ))
    }
}
