use std::sync::Arc;

use log::info;

use crate::auth::AuthContext;
use crate::backend::{fetch_optional, insert_row, Backend};
use crate::error::{Result, VeneredLinkError};
use crate::models::{PrivacyPatch, PrivacySettings, Table};
use crate::table_query::TableQuery;

#[derive(Clone)]
pub struct PrivacyService {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
}

impl PrivacyService {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>) -> Self {
        Self { auth, backend }
    }

    fn mine(&self) -> TableQuery {
        TableQuery::new(Table::PrivacySettings).eq("user_id", self.auth.user_id)
    }

    /// My settings, creating the default row on first access.
    pub async fn load_or_create(&self) -> Result<PrivacySettings> {
        if let Some(settings) = fetch_optional(self.backend.as_ref(), self.mine()).await? {
            return Ok(settings);
        }
        info!("[SOCIAL] Creating default privacy settings for {}", self.auth.user_id);
        let defaults = PrivacySettings::defaults_for(self.auth.user_id);
        insert_row(self.backend.as_ref(), Table::PrivacySettings, &defaults).await
    }

    /// Apply `patch` and return the stored settings.
    pub async fn update(&self, patch: &PrivacyPatch) -> Result<PrivacySettings> {
        let current = self.load_or_create().await?;
        if patch.is_empty() {
            return Ok(current);
        }
        let rows = self
            .backend
            .update(&self.mine(), serde_json::to_value(patch)?)
            .await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            VeneredLinkError::InternalError("privacy update returned no row".into())
        })?;
        Ok(serde_json::from_value(row)?)
    }
}
