//! `Subscription` – consumer handle for a single realtime channel.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::dedup::SeenEvents;
use crate::error::Result;
use crate::models::RealtimeEvent;

/// Callback that releases the channel on the backend side. Runs exactly once,
/// from `close()` or from `Drop`, whichever comes first.
pub(crate) type Release = Box<dyn FnOnce() + Send>;

/// Shared slot for the release callback, so the channel can be released
/// from outside the task that owns the [`Subscription`].
#[derive(Clone)]
pub(crate) struct Releaser {
    channel: String,
    slot: Arc<Mutex<Option<Release>>>,
}

impl Releaser {
    /// Run the release callback if nobody has yet. Returns whether this call ran it.
    pub(crate) fn release(&self) -> bool {
        let release = self.slot.lock().take();
        match release {
            Some(release) => {
                debug!("[REALTIME] Releasing channel '{}'", self.channel);
                release();
                true
            },
            None => false,
        }
    }

    fn is_released(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Open channel on the realtime backend.
///
/// Yields [`RealtimeEvent`]s in publish order, with duplicate deliveries of
/// the same change dropped. The channel is released on `close()` and on
/// drop, so a consumer that bails out early never leaks it.
///
/// # Examples
///
/// ```rust,no_run
/// use venered_link::{ChannelSpec, EventSelector, Realtime, RealtimeEvent, Table};
///
/// # async fn example(realtime: &dyn Realtime) -> venered_link::Result<()> {
/// let spec = ChannelSpec::new("my-messages").on(EventSelector::Insert, Table::Messages, None);
/// let mut subscription = realtime.subscribe(spec).await?;
///
/// while let Some(event) = subscription.next().await {
///     match event? {
///         RealtimeEvent::Change(change) => println!("{:?} on {}", change.kind, change.table),
///         RealtimeEvent::Subscribed { rejoin, .. } => println!("joined (rejoin={})", rejoin),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Subscription {
    channel: String,
    event_rx: mpsc::Receiver<Result<RealtimeEvent>>,
    releaser: Releaser,
    seen: SeenEvents,
    closed: bool,
}

impl Subscription {
    pub(crate) fn new(
        channel: String,
        event_rx: mpsc::Receiver<Result<RealtimeEvent>>,
        dedup_window: usize,
        release: Release,
    ) -> Self {
        let releaser = Releaser {
            channel: channel.clone(),
            slot: Arc::new(Mutex::new(Some(release))),
        };
        Self {
            channel,
            event_rx,
            releaser,
            seen: SeenEvents::new(dedup_window),
            closed: false,
        }
    }

    /// Channel name this subscription was opened with.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the subscription is closed or the backend side
    /// went away.
    pub async fn next(&mut self) -> Option<Result<RealtimeEvent>> {
        loop {
            if self.closed {
                return None;
            }

            match self.event_rx.recv().await {
                Some(Ok(RealtimeEvent::Change(change))) => {
                    if let Some(key) = change.event_key() {
                        if !self.seen.insert(key) {
                            debug!(
                                "[REALTIME] Dropping duplicate {} on '{}'",
                                change.kind.as_str(),
                                self.channel
                            );
                            continue;
                        }
                    }
                    return Some(Ok(RealtimeEvent::Change(change)));
                },
                Some(other) => return Some(other),
                None => {
                    self.closed = true;
                    return None;
                },
            }
        }
    }

    /// Release the channel. Safe to call multiple times.
    pub fn close(&mut self) {
        if self.closed && self.releaser.is_released() {
            return;
        }
        self.closed = true;
        self.event_rx.close();
        self.releaser.release();
    }

    /// Handle that releases this channel immediately, even while another
    /// task is parked in [`next`](Self::next).
    pub(crate) fn releaser(&self) -> Releaser {
        self.releaser.clone()
    }

    /// Returns `true` if `close()` has been called or the stream ended.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeEvent, ChangeKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn make_test_sub(
        capacity: usize,
    ) -> (Subscription, mpsc::Sender<Result<RealtimeEvent>>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(16);
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        let sub = Subscription::new(
            "unit-test".to_string(),
            rx,
            capacity,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (sub, tx, releases)
    }

    fn insert(id: &str, ts: &str) -> RealtimeEvent {
        RealtimeEvent::Change(ChangeEvent {
            channel: "unit-test".into(),
            table: "messages".into(),
            kind: ChangeKind::Insert,
            commit_timestamp: Some(ts.into()),
            record: json!({"id": id}),
            old_record: json!({}),
        })
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let (mut sub, tx, _) = make_test_sub(8);
        tx.send(Ok(insert("m1", "t1"))).await.unwrap();
        tx.send(Ok(insert("m1", "t1"))).await.unwrap();
        tx.send(Ok(insert("m2", "t2"))).await.unwrap();
        drop(tx);

        let mut ids = Vec::new();
        while let Some(Ok(RealtimeEvent::Change(change))) = sub.next().await {
            ids.push(change.row_id().unwrap());
        }
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases_once() {
        let (mut sub, _tx, releases) = make_test_sub(8);
        sub.close();
        sub.close();
        drop(sub);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let (sub, _tx, releases) = make_test_sub(8);
        drop(sub);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_next_returns_none_after_close() {
        let (mut sub, _tx, _) = make_test_sub(8);
        sub.close();
        let result = tokio::time::timeout(Duration::from_millis(100), sub.next())
            .await
            .expect("next() should complete quickly after close");
        assert!(result.is_none());
        assert!(sub.is_closed());
    }

    #[tokio::test]
    async fn test_releaser_runs_once_before_drop() {
        let (mut sub, _tx, releases) = make_test_sub(8);
        let releaser = sub.releaser();
        assert!(releaser.release());
        assert!(!releaser.release());
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        sub.close();
        drop(sub);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_runtime_does_not_panic() {
        let (sub, _tx, releases) = make_test_sub(8);
        drop(sub);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
