//! Unread badge counters for messages and notifications.
//!
//! A counter is seeded with a count query, then kept current from the
//! change feed: matching unread inserts add one, read transitions subtract
//! one (never below zero), and "mark all read" resets it to zero. A rejoin
//! after reconnect re-seeds, since events may have been missed meanwhile.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::backend::Backend;
use crate::error::{Result, VeneredLinkError};
use crate::event_handlers::{AlertCue, EventHandlers};
use crate::models::{
    ChangeEvent, ChangeKind, ChannelSpec, EventSelector, Message, Notification, RowFilter, Table,
};
use crate::realtime::{self, ChangeHandler, Realtime, Watch};
use crate::table_query::TableQuery;

/// What a counter counts: the table, its owner column, and which rows qualify.
pub trait UnreadScope: Send + Sync + 'static {
    /// Typed row decoded from insert and update images.
    type Row: DeserializeOwned + Send;

    const TABLE: Table;
    const OWNER_COLUMN: &'static str;
    const CHANNEL_PREFIX: &'static str;

    fn owner(row: &Self::Row) -> Uuid;
    fn is_read(row: &Self::Row) -> bool;

    /// Rows of the table that never count, whoever owns them.
    fn counts(_row: &Self::Row) -> bool {
        true
    }

    /// Narrow the seed and bulk-update queries the same way `counts` narrows
    /// events.
    fn restrict(query: TableQuery) -> TableQuery {
        query
    }
}

/// Unread direct messages addressed to me.
pub struct MessageScope;

impl UnreadScope for MessageScope {
    type Row = Message;

    const TABLE: Table = Table::Messages;
    const OWNER_COLUMN: &'static str = "receiver_id";
    const CHANNEL_PREFIX: &'static str = "unread-messages";

    fn owner(row: &Message) -> Uuid {
        row.receiver_id
    }

    fn is_read(row: &Message) -> bool {
        row.read
    }
}

/// Unread notifications for me, not counting message notifications (those
/// are already on the message badge).
pub struct NotificationScope;

impl UnreadScope for NotificationScope {
    type Row = Notification;

    const TABLE: Table = Table::Notifications;
    const OWNER_COLUMN: &'static str = "user_id";
    const CHANNEL_PREFIX: &'static str = "unread-notifications";

    fn owner(row: &Notification) -> Uuid {
        row.user_id
    }

    fn is_read(row: &Notification) -> bool {
        row.read
    }

    fn counts(row: &Notification) -> bool {
        !row.kind.is_message()
    }

    fn restrict(query: TableQuery) -> TableQuery {
        query.neq("type", "message")
    }
}

/// Old images may carry only the primary key; a missing `read` counts as
/// unread.
#[derive(Debug, Default, Deserialize)]
struct ReadState {
    #[serde(default)]
    read: Option<bool>,
}

/// Reducer state shared with the drain task.
struct CounterState<S: UnreadScope> {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
    handlers: EventHandlers,
    count_tx: watch::Sender<u64>,
    closed: AtomicBool,
    _scope: PhantomData<fn() -> S>,
}

impl<S: UnreadScope> CounterState<S> {
    fn unread_query(&self) -> TableQuery {
        S::restrict(
            TableQuery::new(S::TABLE)
                .eq(S::OWNER_COLUMN, self.auth.user_id)
                .eq("read", false),
        )
    }

    async fn seed(&self) -> Result<u64> {
        let count = self.backend.count(&self.unread_query()).await?;
        if self.closed.load(Ordering::Acquire) {
            debug!("[UNREAD] {} seed resolved after close, dropped", S::TABLE);
            return Ok(*self.count_tx.borrow());
        }
        self.count_tx.send_replace(count);
        debug!("[UNREAD] {} seeded at {}", S::TABLE, count);
        Ok(count)
    }

    fn decode(&self, change: &ChangeEvent) -> Option<S::Row> {
        match change.new_row::<S::Row>() {
            Ok(row) => Some(row),
            Err(e) => {
                warn!("[UNREAD] Skipping undecodable {} row: {}", change.table, e);
                None
            },
        }
    }

    fn mine(&self, row: &S::Row) -> bool {
        S::owner(row) == self.auth.user_id && S::counts(row)
    }

    fn on_insert(&self, change: &ChangeEvent) {
        let Some(row) = self.decode(change) else {
            return;
        };
        if !self.mine(&row) || S::is_read(&row) {
            return;
        }
        self.count_tx.send_modify(|count| *count += 1);
        self.handlers
            .emit_alert(AlertCue::new(S::TABLE.as_str(), change.row_id()));
    }

    fn on_update(&self, change: &ChangeEvent) {
        let Some(row) = self.decode(change) else {
            return;
        };
        if !self.mine(&row) || !S::is_read(&row) {
            return;
        }
        let old: ReadState = change.old_row().unwrap_or_default();
        if old.read == Some(true) {
            return;
        }
        self.count_tx
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    fn apply(&self, change: &ChangeEvent) {
        if change.table != S::TABLE.as_str() {
            return;
        }
        match change.kind {
            ChangeKind::Insert => self.on_insert(change),
            ChangeKind::Update => self.on_update(change),
            ChangeKind::Delete => {},
        }
    }
}

#[async_trait]
impl<S: UnreadScope> ChangeHandler for CounterState<S> {
    async fn on_change(&self, change: ChangeEvent) {
        self.apply(&change);
    }

    async fn on_joined(&self, rejoin: bool) {
        if rejoin {
            info!("[UNREAD] {} channel rejoined, re-seeding", S::TABLE);
            if let Err(e) = self.seed().await {
                warn!("[UNREAD] Failed to re-seed {}: {}", S::TABLE, e);
            }
        }
    }

    async fn on_error(&self, error: VeneredLinkError) {
        warn!("[UNREAD] {} channel error: {}", S::TABLE, error);
    }
}

/// Live unread count for one [`UnreadScope`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use venered_link::{AuthContext, EventHandlers, MemoryBackend, UnreadMessages};
///
/// # async fn example(auth: AuthContext) -> venered_link::Result<()> {
/// let backend = MemoryBackend::new();
/// let badge = UnreadMessages::new(auth, Arc::new(backend.clone()), EventHandlers::new());
/// badge.start(&backend).await?;
/// println!("{} unread", badge.count());
/// # Ok(())
/// # }
/// ```
pub struct UnreadCounter<S: UnreadScope> {
    state: Arc<CounterState<S>>,
    watch: Mutex<Option<Watch>>,
}

pub type UnreadMessages = UnreadCounter<MessageScope>;
pub type UnreadNotifications = UnreadCounter<NotificationScope>;

impl<S: UnreadScope> UnreadCounter<S> {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>, handlers: EventHandlers) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            state: Arc::new(CounterState {
                auth,
                backend,
                handlers,
                count_tx,
                closed: AtomicBool::new(false),
                _scope: PhantomData,
            }),
            watch: Mutex::new(None),
        }
    }

    /// Channel name: one per scope and user.
    pub fn channel_name(&self) -> String {
        format!("{}-{}", S::CHANNEL_PREFIX, self.state.auth.user_key())
    }

    /// Inserts and updates on my rows of the scope's table.
    pub fn channel_spec(&self) -> ChannelSpec {
        let filter = RowFilter::eq(S::OWNER_COLUMN, self.state.auth.user_id);
        ChannelSpec::new(self.channel_name())
            .on(EventSelector::Insert, S::TABLE, Some(filter.clone()))
            .on(EventSelector::Update, S::TABLE, Some(filter))
    }

    /// Set the counter from a count query. Safe to repeat.
    pub async fn seed(&self) -> Result<u64> {
        self.state.seed().await
    }

    /// Seed, then follow the change feed from a background task.
    ///
    /// A failed seed is logged and the counter keeps its value. A failed
    /// subscribe is logged and returned; it is not retried.
    pub async fn start(&self, realtime: &dyn Realtime) -> Result<()> {
        let previous = self.watch.lock().take();
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        self.state.closed.store(false, Ordering::Release);

        if let Err(e) = self.state.seed().await {
            warn!("[UNREAD] Failed to seed {}: {}", S::TABLE, e);
        }

        match realtime::watch(realtime, self.channel_spec(), self.state.clone()).await {
            Ok(watch) => {
                *self.watch.lock() = Some(watch);
                Ok(())
            },
            Err(e) => {
                warn!("[UNREAD] Failed to subscribe to {}: {}", S::TABLE, e);
                Err(e)
            },
        }
    }

    /// Feed one change through the reducer.
    pub fn apply(&self, change: &ChangeEvent) {
        self.state.apply(change);
    }

    /// Bulk-mark my unread rows read. The local counter is 0 afterwards
    /// whether or not the backend accepted the update.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let result = self
            .state
            .backend
            .update(&self.state.unread_query(), json!({ "read": true }))
            .await;
        self.state.count_tx.send_replace(0);
        match result {
            Ok(rows) => {
                debug!("[UNREAD] Marked {} {} rows read", rows.len(), S::TABLE);
                Ok(())
            },
            Err(e) => {
                warn!("[UNREAD] Mark all {} read failed: {}", S::TABLE, e);
                Err(e)
            },
        }
    }

    pub fn count(&self) -> u64 {
        *self.state.count_tx.borrow()
    }

    /// Receiver that observes every counter change.
    pub fn subscribe_count(&self) -> watch::Receiver<u64> {
        self.state.count_tx.subscribe()
    }

    /// Whether the background task is following the change feed.
    pub fn is_live(&self) -> bool {
        self.watch.lock().as_ref().map_or(false, Watch::is_active)
    }

    /// Stop following the change feed and release the channel. Seeds that
    /// resolve afterwards are dropped. Idempotent.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        if let Some(mut watch) = self.watch.lock().take() {
            watch.close();
        }
    }
}

impl<S: UnreadScope> Drop for UnreadCounter<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::Value as JsonValue;

    fn change(kind: ChangeKind, table: Table, record: JsonValue, old: JsonValue) -> ChangeEvent {
        ChangeEvent {
            channel: "test".into(),
            table: table.as_str().into(),
            kind,
            commit_timestamp: None,
            record,
            old_record: old,
        }
    }

    fn message(receiver: Uuid, read: bool) -> JsonValue {
        json!({
            "id": Uuid::new_v4(),
            "sender_id": Uuid::new_v4(),
            "receiver_id": receiver,
            "content": "hi",
            "read": read,
            "created_at": "2024-05-01T10:00:00Z",
        })
    }

    fn counter<S: UnreadScope>(me: Uuid) -> UnreadCounter<S> {
        UnreadCounter::new(
            AuthContext::new(me, "tok"),
            Arc::new(MemoryBackend::new()),
            EventHandlers::new(),
        )
    }

    #[test]
    fn test_insert_and_read_transition() {
        let me = Uuid::new_v4();
        let badge = counter::<MessageScope>(me);

        badge.apply(&change(ChangeKind::Insert, Table::Messages, message(me, false), JsonValue::Null));
        badge.apply(&change(ChangeKind::Insert, Table::Messages, message(me, false), JsonValue::Null));
        assert_eq!(badge.count(), 2);

        let row = message(me, true);
        badge.apply(&change(ChangeKind::Update, Table::Messages, row, json!({"read": false})));
        assert_eq!(badge.count(), 1);
    }

    #[test]
    fn test_ignores_foreign_read_and_already_read_rows() {
        let me = Uuid::new_v4();
        let badge = counter::<MessageScope>(me);

        badge.apply(&change(ChangeKind::Insert, Table::Messages, message(Uuid::new_v4(), false), JsonValue::Null));
        badge.apply(&change(ChangeKind::Insert, Table::Messages, message(me, true), JsonValue::Null));
        assert_eq!(badge.count(), 0);

        badge.apply(&change(ChangeKind::Insert, Table::Messages, message(me, false), JsonValue::Null));
        badge.apply(&change(ChangeKind::Update, Table::Messages, message(me, true), json!({"read": true})));
        assert_eq!(badge.count(), 1);
    }

    #[test]
    fn test_never_negative() {
        let me = Uuid::new_v4();
        let badge = counter::<MessageScope>(me);
        for _ in 0..3 {
            badge.apply(&change(ChangeKind::Update, Table::Messages, message(me, true), json!({"id": "x"})));
        }
        assert_eq!(badge.count(), 0);
    }

    #[test]
    fn test_message_notifications_do_not_count() {
        let me = Uuid::new_v4();
        let badge = counter::<NotificationScope>(me);
        let row = |kind: &str, read: bool| {
            json!({
                "id": Uuid::new_v4(),
                "user_id": me,
                "type": kind,
                "read": read,
                "created_at": "2024-05-01T10:00:00Z",
            })
        };

        badge.apply(&change(ChangeKind::Insert, Table::Notifications, row("message", false), JsonValue::Null));
        badge.apply(&change(ChangeKind::Insert, Table::Notifications, row("like", false), JsonValue::Null));
        assert_eq!(badge.count(), 1);

        badge.apply(&change(ChangeKind::Update, Table::Notifications, row("message", true), json!({"read": false})));
        assert_eq!(badge.count(), 1);
    }

    #[test]
    fn test_undecodable_rows_are_skipped() {
        let me = Uuid::new_v4();
        let badge = counter::<MessageScope>(me);
        badge.apply(&change(ChangeKind::Insert, Table::Messages, json!({"id": 7}), JsonValue::Null));
        assert_eq!(badge.count(), 0);
    }

    #[test]
    fn test_alert_fires_on_counted_insert() {
        use std::sync::atomic::AtomicUsize;

        let me = Uuid::new_v4();
        let alerts = Arc::new(AtomicUsize::new(0));
        let seen = alerts.clone();
        let badge = UnreadMessages::new(
            AuthContext::new(me, "tok"),
            Arc::new(MemoryBackend::new()),
            EventHandlers::new().on_alert(move |cue| {
                assert_eq!(cue.table, "messages");
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        badge.apply(&change(ChangeKind::Insert, Table::Messages, message(me, false), JsonValue::Null));
        badge.apply(&change(ChangeKind::Insert, Table::Messages, message(me, true), JsonValue::Null));
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channel_spec_scopes_to_owner() {
        let me = Uuid::new_v4();
        let badge = counter::<NotificationScope>(me);
        let spec = badge.channel_spec();
        assert_eq!(spec.name, format!("unread-notifications-{}", me));
        assert_eq!(spec.bindings.len(), 2);
        assert_eq!(
            spec.bindings[0].filter.as_ref().map(|f| f.to_string()),
            Some(format!("user_id=eq.{}", me))
        );
    }
}
