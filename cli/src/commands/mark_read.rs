use uuid::Uuid;
use venered_cli::{CLIError, OutputFormatter, Result};
use venered_link::{EventHandlers, NotificationFeed, UnreadMessages, UnreadNotifications};

use crate::connect::Connected;

/// What `mark-read` should touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    One(Uuid),
    AllNotifications,
    AllMessages,
    Everything,
}

pub fn target(id: Option<Uuid>, all: bool, messages: bool) -> Result<Target> {
    match (id, all, messages) {
        (Some(id), _, _) => Ok(Target::One(id)),
        (None, true, true) => Ok(Target::Everything),
        (None, true, false) => Ok(Target::AllNotifications),
        (None, false, true) => Ok(Target::AllMessages),
        (None, false, false) => Err(CLIError::ParseError(
            "pass --id, --all or --messages".to_string(),
        )),
    }
}

pub async fn run(connected: &Connected, formatter: &OutputFormatter, target: Target) -> Result<()> {
    let auth = connected.auth.clone();
    let backend = connected.backend.clone();

    if let Target::One(id) = target {
        NotificationFeed::new(auth, backend).mark_as_read(id).await?;
        println!("{}", formatter.format_success(&format!("Notification {} marked read", id)));
        return Ok(());
    }

    if matches!(target, Target::AllNotifications | Target::Everything) {
        UnreadNotifications::new(auth.clone(), backend.clone(), EventHandlers::new())
            .mark_all_as_read()
            .await?;
        println!("{}", formatter.format_success("All notifications marked read"));
    }
    if matches!(target, Target::AllMessages | Target::Everything) {
        UnreadMessages::new(auth, backend, EventHandlers::new())
            .mark_all_as_read()
            .await?;
        println!("{}", formatter.format_success("All messages marked read"));
    }
    Ok(())
}
