//! Admin checks and user bans.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::backend::{call_rpc, fetch_rows, insert_row, Backend};
use crate::error::{Result, VeneredLinkError};
use crate::models::{BannedUser, Table};
use crate::table_query::TableQuery;

#[derive(Debug, Serialize)]
struct NewBan<'a> {
    user_id: Uuid,
    banned_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ModerationService {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
}

impl ModerationService {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>) -> Self {
        Self { auth, backend }
    }

    pub async fn is_admin(&self) -> Result<bool> {
        call_rpc(
            self.backend.as_ref(),
            "is_admin",
            json!({ "user_id": self.auth.user_id }),
        )
        .await
    }

    /// Whether nobody has claimed `username` yet.
    pub async fn username_available(&self, username: &str) -> Result<bool> {
        let username = username.trim();
        if username.is_empty() {
            return Err(VeneredLinkError::ValidationError("username is empty".into()));
        }
        call_rpc(
            self.backend.as_ref(),
            "check_username_availability",
            json!({ "username_to_check": username }),
        )
        .await
    }

    pub async fn is_banned(&self, user: Uuid) -> Result<bool> {
        call_rpc(self.backend.as_ref(), "is_user_banned", json!({ "user_id": user })).await
    }

    async fn require_admin(&self) -> Result<()> {
        if self.is_admin().await? {
            Ok(())
        } else {
            Err(VeneredLinkError::PermissionDenied(format!(
                "{} is not an admin",
                self.auth.user_id
            )))
        }
    }

    /// Ban `user`, until `expires_at` when given, permanently otherwise.
    pub async fn ban(
        &self,
        user: Uuid,
        reason: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<BannedUser> {
        self.require_admin().await?;
        if user == self.auth.user_id {
            return Err(VeneredLinkError::ValidationError("cannot ban yourself".into()));
        }
        let row = NewBan {
            user_id: user,
            banned_by: self.auth.user_id,
            reason: reason.map(str::trim).filter(|r| !r.is_empty()),
            expires_at,
        };
        let ban: BannedUser = insert_row(self.backend.as_ref(), Table::BannedUsers, &row).await?;
        info!("[SOCIAL] {} banned {}", self.auth.user_id, user);
        Ok(ban)
    }

    /// Lift every active ban on `user`. Returns how many were lifted.
    pub async fn unban(&self, user: Uuid) -> Result<usize> {
        self.require_admin().await?;
        let query = TableQuery::new(Table::BannedUsers)
            .eq("user_id", user)
            .eq("is_active", true);
        let lifted = self
            .backend
            .update(&query, json!({ "is_active": false }))
            .await?;
        info!("[SOCIAL] {} lifted {} ban(s) on {}", self.auth.user_id, lifted.len(), user);
        Ok(lifted.len())
    }

    /// Active bans, newest first.
    pub async fn active_bans(&self) -> Result<Vec<BannedUser>> {
        self.require_admin().await?;
        let query = TableQuery::new(Table::BannedUsers)
            .eq("is_active", true)
            .order("banned_at", false);
        let now = Utc::now();
        Ok(fetch_rows::<BannedUser>(self.backend.as_ref(), &query)
            .await?
            .into_iter()
            .filter(|b| b.is_in_effect(now))
            .collect())
    }
}
