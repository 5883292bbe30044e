//! Notification feed kept in sync with the change feed.
//!
//! The feed holds the newest [`FEED_WINDOW`] notifications (message
//! notifications excluded), each hydrated with the related user and post.
//! Inserts are refetched with their hydration and prepended, updates are
//! patched in place without reordering, deletes drop the row.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::backend::{fetch_optional, fetch_rows, Backend};
use crate::error::{Result, VeneredLinkError};
use crate::models::{
    ChangeEvent, ChangeKind, ChannelSpec, EventSelector, Notification, NotificationItem,
    PostSummary, ProfileSummary, RowFilter, Table,
};
use crate::mutation::MutationTracker;
use crate::realtime::{self, ChangeHandler, Realtime, Watch};
use crate::table_query::TableQuery;
use crate::unread::UnreadNotifications;

/// Rows kept in the feed.
pub const FEED_WINDOW: usize = 50;

struct FeedState {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
    items: RwLock<Vec<NotificationItem>>,
    tracker: MutationTracker,
    revision_tx: watch::Sender<u64>,
    closed: AtomicBool,
    window: usize,
}

impl FeedState {
    fn base_query(&self) -> TableQuery {
        TableQuery::new(Table::Notifications)
            .eq("user_id", self.auth.user_id)
            .neq("type", "message")
    }

    fn bump(&self) {
        self.revision_tx.send_modify(|rev| *rev += 1);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Attach related users and posts with one batched query each.
    async fn hydrate(&self, notifications: Vec<Notification>) -> Result<Vec<NotificationItem>> {
        let user_ids: HashSet<Uuid> = notifications.iter().filter_map(|n| n.related_user_id).collect();
        let post_ids: HashSet<Uuid> = notifications.iter().filter_map(|n| n.related_post_id).collect();

        let users: HashMap<Uuid, ProfileSummary> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            let query = TableQuery::new(Table::Profiles)
                .columns(ProfileSummary::COLUMNS)
                .is_in("id", &user_ids);
            fetch_rows::<ProfileSummary>(self.backend.as_ref(), &query)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };
        let posts: HashMap<Uuid, PostSummary> = if post_ids.is_empty() {
            HashMap::new()
        } else {
            let query = TableQuery::new(Table::Posts)
                .columns(PostSummary::COLUMNS)
                .is_in("id", &post_ids);
            fetch_rows::<PostSummary>(self.backend.as_ref(), &query)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        Ok(notifications
            .into_iter()
            .map(|notification| NotificationItem {
                related_user: notification.related_user_id.and_then(|id| users.get(&id).cloned()),
                related_post: notification.related_post_id.and_then(|id| posts.get(&id).cloned()),
                notification,
            })
            .collect())
    }

    async fn load(&self) -> Result<usize> {
        let query = self.base_query().order("created_at", false).limit(self.window);
        let notifications: Vec<Notification> = fetch_rows(self.backend.as_ref(), &query).await?;
        let items = self.hydrate(notifications).await?;
        if self.is_closed() {
            debug!("[FEED] Load resolved after close, dropped");
            return Ok(0);
        }
        let loaded = items.len();
        *self.items.write() = items;
        self.bump();
        debug!("[FEED] Loaded {} notifications", loaded);
        Ok(loaded)
    }

    fn accepts(&self, notification: &Notification) -> bool {
        notification.user_id == self.auth.user_id && !notification.kind.is_message()
    }

    /// Refetch one row with its hydration. Falls back to the event image
    /// when the refetch fails.
    async fn hydrated_row(&self, fallback: Notification) -> NotificationItem {
        let query = self.base_query().eq("id", fallback.id);
        let fetched = match fetch_optional::<Notification>(self.backend.as_ref(), query).await {
            Ok(Some(row)) => row,
            Ok(None) => fallback,
            Err(e) => {
                warn!("[FEED] Refetch of notification {} failed: {}", fallback.id, e);
                fallback
            },
        };
        match self.hydrate(vec![fetched.clone()]).await {
            Ok(mut items) if !items.is_empty() => items.remove(0),
            Ok(_) => NotificationItem::bare(fetched),
            Err(e) => {
                warn!("[FEED] Hydration of notification {} failed: {}", fetched.id, e);
                NotificationItem::bare(fetched)
            },
        }
    }

    async fn on_insert(&self, change: &ChangeEvent) {
        let notification: Notification = match change.new_row() {
            Ok(row) => row,
            Err(e) => {
                warn!("[FEED] Skipping undecodable notification: {}", e);
                return;
            },
        };
        if !self.accepts(&notification) {
            return;
        }
        let item = self.hydrated_row(notification).await;
        if self.is_closed() {
            return;
        }
        self.insert_item(item);
    }

    fn insert_item(&self, item: NotificationItem) {
        {
            let mut items = self.items.write();
            if let Some(existing) = items.iter_mut().find(|i| i.id() == item.id()) {
                *existing = item;
            } else {
                items.insert(0, item);
                items.truncate(self.window);
            }
        }
        self.bump();
    }

    fn on_update(&self, change: &ChangeEvent) {
        let notification: Notification = match change.new_row() {
            Ok(row) => row,
            Err(e) => {
                warn!("[FEED] Skipping undecodable notification update: {}", e);
                return;
            },
        };
        let patched = {
            let mut items = self.items.write();
            match items.iter_mut().find(|i| i.id() == notification.id) {
                Some(item) => {
                    item.notification = notification;
                    true
                },
                None => false,
            }
        };
        if patched {
            self.bump();
        }
    }

    fn on_delete(&self, change: &ChangeEvent) {
        let Some(id) = change.row_id().and_then(|id| Uuid::parse_str(&id).ok()) else {
            return;
        };
        let removed = {
            let mut items = self.items.write();
            let before = items.len();
            items.retain(|i| i.id() != id);
            items.len() != before
        };
        if removed {
            self.bump();
        }
    }

    fn set_read(&self, id: Uuid, read: bool) -> Option<bool> {
        let mut items = self.items.write();
        let item = items.iter_mut().find(|i| i.id() == id)?;
        let previous = item.notification.read;
        item.notification.read = read;
        Some(previous)
    }
}

#[async_trait]
impl ChangeHandler for FeedState {
    async fn on_change(&self, change: ChangeEvent) {
        if change.table != Table::Notifications.as_str() {
            return;
        }
        match change.kind {
            ChangeKind::Insert => self.on_insert(&change).await,
            ChangeKind::Update => self.on_update(&change),
            ChangeKind::Delete => self.on_delete(&change),
        }
    }

    async fn on_joined(&self, rejoin: bool) {
        if rejoin {
            info!("[FEED] Channel rejoined, reloading");
            if let Err(e) = self.load().await {
                warn!("[FEED] Reload failed: {}", e);
            }
        }
    }

    async fn on_error(&self, error: VeneredLinkError) {
        warn!("[FEED] Channel error: {}", error);
    }
}

/// The signed-in user's notification list.
pub struct NotificationFeed {
    state: Arc<FeedState>,
    watch: Mutex<Option<Watch>>,
}

impl NotificationFeed {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>) -> Self {
        Self::with_window(auth, backend, FEED_WINDOW)
    }

    pub fn with_window(auth: AuthContext, backend: Arc<dyn Backend>, window: usize) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: Arc::new(FeedState {
                auth,
                backend,
                items: RwLock::new(Vec::new()),
                tracker: MutationTracker::default(),
                revision_tx,
                closed: AtomicBool::new(false),
                window: window.max(1),
            }),
            watch: Mutex::new(None),
        }
    }

    pub fn channel_name(&self) -> String {
        format!("notifications-feed-{}", self.state.auth.user_key())
    }

    pub fn channel_spec(&self) -> ChannelSpec {
        ChannelSpec::new(self.channel_name()).on(
            EventSelector::All,
            Table::Notifications,
            Some(RowFilter::eq("user_id", self.state.auth.user_id)),
        )
    }

    /// Replace the list with the newest notifications.
    pub async fn load(&self) -> Result<usize> {
        self.state.load().await
    }

    /// Load, then follow the change feed from a background task.
    pub async fn start(&self, realtime: &dyn Realtime) -> Result<()> {
        let previous = self.watch.lock().take();
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        self.state.closed.store(false, Ordering::Release);

        if let Err(e) = self.state.load().await {
            warn!("[FEED] Initial load failed: {}", e);
        }
        match realtime::watch(realtime, self.channel_spec(), self.state.clone()).await {
            Ok(watch) => {
                *self.watch.lock() = Some(watch);
                Ok(())
            },
            Err(e) => {
                warn!("[FEED] Failed to subscribe: {}", e);
                Err(e)
            },
        }
    }

    /// Feed one change through the reconciler.
    pub async fn apply(&self, change: ChangeEvent) {
        self.state.on_change(change).await;
    }

    /// Mark one notification read, locally first. The local patch is rolled
    /// back when the backend rejects the update.
    pub async fn mark_as_read(&self, id: Uuid) -> Result<()> {
        let previous = self.state.set_read(id, true);
        if previous == Some(true) {
            return Ok(());
        }
        if previous.is_some() {
            self.state.bump();
        }

        let mutation = self.state.tracker.begin(format!("mark notification {} read", id));
        let query = TableQuery::new(Table::Notifications)
            .eq("id", id)
            .eq("user_id", self.state.auth.user_id);
        match self.state.backend.update(&query, json!({ "read": true })).await {
            Ok(_) => {
                self.state.tracker.confirm(mutation);
                Ok(())
            },
            Err(e) => {
                warn!("[FEED] Mark {} read failed, rolling back: {}", id, e);
                self.state.tracker.fail(mutation, e.to_string());
                if let Some(previous) = previous {
                    self.state.set_read(id, previous);
                    self.state.bump();
                }
                Err(e)
            },
        }
    }

    /// Bulk-mark through the badge counter, then mark every loaded row read.
    pub async fn mark_all_as_read(&self, counter: &UnreadNotifications) -> Result<()> {
        let result = counter.mark_all_as_read().await;
        {
            let mut items = self.state.items.write();
            for item in items.iter_mut() {
                item.notification.read = true;
            }
        }
        self.state.bump();
        result
    }

    /// Snapshot, newest first.
    pub fn items(&self) -> Vec<NotificationItem> {
        self.state.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.state.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.read().is_empty()
    }

    /// Unread rows among the loaded ones.
    pub fn unread_loaded(&self) -> usize {
        self.state.items.read().iter().filter(|i| !i.is_read()).count()
    }

    pub fn mutations(&self) -> &MutationTracker {
        &self.state.tracker
    }

    /// Receiver that ticks whenever the list changes.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.state.revision_tx.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.watch.lock().as_ref().map_or(false, Watch::is_active)
    }

    /// Stop following the change feed. Fetches that resolve afterwards are
    /// dropped. Idempotent.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        if let Some(mut watch) = self.watch.lock().take() {
            watch.close();
        }
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.close();
    }
}
