use venered_cli::{OutputFormatter, Result};
use venered_link::NotificationFeed;

use crate::connect::Connected;

pub async fn run(connected: &Connected, formatter: &OutputFormatter, limit: usize) -> Result<()> {
    let feed = NotificationFeed::with_window(
        connected.auth.clone(),
        connected.backend.clone(),
        limit.max(1),
    );
    feed.load().await?;
    println!("{}", formatter.format_feed(&feed.items()));
    Ok(())
}
