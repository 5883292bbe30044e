use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The profile columns every list view hydrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl ProfileSummary {
    pub const COLUMNS: &'static [&'static str] = &["id", "username", "full_name", "avatar_url"];

    /// Full name when set, username otherwise.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.username,
        }
    }
}
