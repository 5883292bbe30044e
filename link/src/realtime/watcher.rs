//! Background drain of a [`Subscription`] into a [`ChangeHandler`].

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::task::JoinHandle;

use super::subscription::Releaser;
use super::Realtime;
use crate::error::{Result, VeneredLinkError};
use crate::models::{ChangeEvent, ChannelSpec, RealtimeEvent};

/// Reacts to the events of one channel.
#[async_trait]
pub trait ChangeHandler: Send + Sync + 'static {
    /// A row change arrived.
    async fn on_change(&self, change: ChangeEvent);

    /// The channel was (re)joined. After a rejoin events may have been
    /// missed, so derived state should be re-seeded.
    async fn on_joined(&self, _rejoin: bool) {}

    /// The channel reported an error. The subscription stays open.
    async fn on_error(&self, error: VeneredLinkError) {
        warn!("[REALTIME] Channel error: {}", error);
    }
}

/// Adapts a plain closure into a [`ChangeHandler`].
///
/// ```rust
/// use venered_link::FnHandler;
///
/// let handler = FnHandler::new(|change| println!("{:?} {}", change.kind, change.table));
/// ```
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(ChangeEvent) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ChangeHandler for FnHandler<F>
where
    F: Fn(ChangeEvent) + Send + Sync + 'static,
{
    async fn on_change(&self, change: ChangeEvent) {
        (self.f)(change);
    }
}

/// Handle to a running drain task. Closing or dropping it releases the
/// channel before returning and stops the task.
pub struct Watch {
    channel: String,
    releaser: Releaser,
    task: Option<JoinHandle<()>>,
}

impl Watch {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the drain task is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Release the channel and stop the drain task. Safe to call multiple
    /// times. The name is free for a new subscriber once this returns.
    pub fn close(&mut self) {
        self.releaser.release();
        if let Some(task) = self.task.take() {
            debug!("[REALTIME] Closing watch on '{}'", self.channel);
            task.abort();
        }
    }

    /// Close, then wait for the drain task to finish so no handler call is
    /// still in flight.
    pub async fn shutdown(mut self) {
        self.releaser.release();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!("[REALTIME] Watch on '{}' shut down", self.channel);
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.close();
    }
}

/// Subscribe to `spec` and feed every event to `handler` from a spawned task.
///
/// Events are handled one at a time in delivery order.
pub async fn watch<H: ChangeHandler>(
    realtime: &dyn Realtime,
    spec: ChannelSpec,
    handler: Arc<H>,
) -> Result<Watch> {
    let channel = spec.name.clone();
    let mut subscription = realtime.subscribe(spec).await?;
    let releaser = subscription.releaser();

    let name = channel.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            match event {
                Ok(RealtimeEvent::Subscribed { rejoin, .. }) => handler.on_joined(rejoin).await,
                Ok(RealtimeEvent::Change(change)) => handler.on_change(change).await,
                Err(e) => handler.on_error(e).await,
            }
        }
        debug!("[REALTIME] Subscription '{}' ended", name);
    });

    Ok(Watch {
        channel,
        releaser,
        task: Some(task),
    })
}
