use std::collections::HashSet;
use std::io::Write;

use uuid::Uuid;
use venered_cli::{OutputFormatter, Result};
use venered_link::{AlertCue, EventHandlers, NotificationItem};

use crate::connect::Connected;

/// Handlers for a live session: the alert cue rings the terminal bell and
/// connection changes go to the log.
pub fn live_handlers() -> EventHandlers {
    EventHandlers::new()
        .on_alert(|cue: AlertCue| {
            log::debug!("[UNREAD] Alert for {} row {:?}", cue.table, cue.row_id);
            print!("\x07");
            let _ = std::io::stdout().flush();
        })
        .on_connect(|| log::info!("[REALTIME] Connected"))
        .on_disconnect(|reason| log::warn!("[REALTIME] Disconnected: {}", reason.message))
        .on_error(|error| log::warn!("[REALTIME] {}", error))
}

/// Rows not printed yet, oldest first. `seen` only keeps ids still in the
/// window, so it never outgrows the feed.
fn unseen<'a>(items: &'a [NotificationItem], seen: &mut HashSet<Uuid>) -> Vec<&'a NotificationItem> {
    let current: HashSet<Uuid> = items.iter().map(NotificationItem::id).collect();
    seen.retain(|id| current.contains(id));
    let mut fresh: Vec<_> = items.iter().filter(|i| seen.insert(i.id())).collect();
    fresh.reverse();
    fresh
}

pub async fn run(connected: &Connected, formatter: &OutputFormatter) -> Result<()> {
    let session = connected.client.session(connected.auth.clone()).await?;
    let messages = session.unread_messages();
    let notifications = session.unread_notifications();
    let feed = session.notification_feed();

    messages.start(session.realtime()).await?;
    notifications.start(session.realtime()).await?;
    feed.start(session.realtime()).await?;

    let mut messages_rx = messages.subscribe_count();
    let mut notifications_rx = notifications.subscribe_count();
    let mut feed_rx = feed.subscribe_changes();

    let mut seen = HashSet::new();
    println!("{}", formatter.format_feed(&feed.items()));
    unseen(&feed.items(), &mut seen);
    println!("{}", formatter.format_counts(messages.count(), notifications.count()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = messages_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", formatter.format_counts(messages.count(), notifications.count()));
            },
            changed = notifications_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", formatter.format_counts(messages.count(), notifications.count()));
            },
            changed = feed_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let items = feed.items();
                for item in unseen(&items, &mut seen) {
                    println!("{}", formatter.format_notification(item));
                }
            },
        }
    }

    messages.close();
    notifications.close();
    feed.close();
    Ok(())
}
