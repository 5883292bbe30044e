//! Terminal output for badges, notifications and social commands.

use colored::{ColoredString, Colorize};
use venered_link::{Delivery, NotificationItem, ProfileSummary};

use crate::error::CLIError;

/// Maximum width of a notification body before truncation
const MAX_BODY_WIDTH: usize = 72;

/// Formats command results for display
pub struct OutputFormatter {
    color: bool,
}

impl OutputFormatter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Truncate a string to max width with ellipsis
    fn truncate_value(value: &str, max_width: usize) -> String {
        if value.chars().count() <= max_width {
            value.to_string()
        } else if max_width <= 3 {
            value.chars().take(max_width).collect()
        } else {
            let take = max_width - 3;
            format!("{}...", value.chars().take(take).collect::<String>())
        }
    }

    fn badge(&self, label: &str, count: u64) -> String {
        let value = count.to_string();
        let value = if count > 0 {
            self.paint(&value, |s| s.red().bold())
        } else {
            self.paint(&value, |s| s.dimmed())
        };
        format!("{} {}", label, value)
    }

    /// One line with both badge counters.
    pub fn format_counts(&self, messages: u64, notifications: u64) -> String {
        format!(
            "{}  {}",
            self.badge("Messages:", messages),
            self.badge("Notifications:", notifications)
        )
    }

    /// One feed row: unread marker, kind, who, body and time.
    pub fn format_notification(&self, item: &NotificationItem) -> String {
        let n = &item.notification;
        let marker = if n.read {
            " ".to_string()
        } else {
            self.paint("*", |s| s.cyan().bold())
        };
        let kind = self.paint(&format!("{:<8}", n.kind.as_str()), |s| s.yellow());
        let body = if n.message.is_empty() { &n.title } else { &n.message };
        let body = Self::truncate_value(body, MAX_BODY_WIDTH);
        let who = item
            .related_user
            .as_ref()
            .map(|u| format!("{} ", self.paint(u.display_name(), |s| s.bold())))
            .unwrap_or_default();
        let when = self.paint(&n.created_at.format("%Y-%m-%d %H:%M").to_string(), |s| s.dimmed());

        format!("{} {} {}{}  {}", marker, kind, who, body, when)
    }

    pub fn format_feed(&self, items: &[NotificationItem]) -> String {
        if items.is_empty() {
            return self.paint("No notifications", |s| s.dimmed());
        }
        items
            .iter()
            .map(|item| self.format_notification(item))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One profile per line; `empty` when there are none.
    pub fn format_profiles(&self, profiles: &[ProfileSummary], empty: &str) -> String {
        if profiles.is_empty() {
            return self.paint(empty, |s| s.dimmed());
        }
        profiles
            .iter()
            .map(|p| {
                let handle = self.paint(&format!("@{}", p.username), |s| s.bold());
                match &p.full_name {
                    Some(name) if !name.is_empty() => format!("{} {}  {}", handle, name, p.id),
                    _ => format!("{}  {}", handle, p.id),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn format_delivery(&self, delivery: &Delivery) -> String {
        if delivery.is_request() {
            self.format_success("Message request sent")
        } else {
            self.format_success("Message sent")
        }
    }

    pub fn format_success(&self, message: &str) -> String {
        format!("{} {}", self.paint("✓", |s| s.green().bold()), message)
    }

    pub fn format_error(&self, error: &CLIError) -> String {
        format!("{} {}", self.paint("✗", |s| s.red().bold()), error)
    }
}
