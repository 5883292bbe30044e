use venered_cli::{OutputFormatter, Result};
use venered_link::{EventHandlers, UnreadMessages, UnreadNotifications};

use crate::connect::Connected;

/// Seed both counters once and print them.
pub async fn run(connected: &Connected, formatter: &OutputFormatter) -> Result<()> {
    let messages = UnreadMessages::new(
        connected.auth.clone(),
        connected.backend.clone(),
        EventHandlers::new(),
    );
    let notifications = UnreadNotifications::new(
        connected.auth.clone(),
        connected.backend.clone(),
        EventHandlers::new(),
    );

    let messages = messages.seed().await?;
    let notifications = notifications.seed().await?;
    println!("{}", formatter.format_counts(messages, notifications));
    Ok(())
}
