use std::sync::Arc;

use log::debug;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::backend::{fetch_optional, fetch_rows, insert_row, Backend};
use crate::error::{Result, VeneredLinkError};
use crate::models::{Follow, FollowStatus, Table};
use crate::table_query::TableQuery;

#[derive(Debug, Serialize)]
struct NewFollow {
    follower_id: Uuid,
    following_id: Uuid,
    status: FollowStatus,
}

/// Directed follow edges from the signed-in user's point of view.
#[derive(Clone)]
pub struct FollowService {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
}

impl FollowService {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>) -> Self {
        Self { auth, backend }
    }

    fn edge(&self, follower: Uuid, following: Uuid) -> TableQuery {
        TableQuery::new(Table::Follows)
            .eq("follower_id", follower)
            .eq("following_id", following)
    }

    /// Follow `target`. Follows are accepted immediately.
    pub async fn follow(&self, target: Uuid) -> Result<Follow> {
        if target == self.auth.user_id {
            return Err(VeneredLinkError::ValidationError("cannot follow yourself".into()));
        }
        let existing: Option<Follow> =
            fetch_optional(self.backend.as_ref(), self.edge(self.auth.user_id, target)).await?;
        if existing.is_some() {
            return Err(VeneredLinkError::AlreadyFollowing(target.to_string()));
        }

        let row = NewFollow {
            follower_id: self.auth.user_id,
            following_id: target,
            status: FollowStatus::Accepted,
        };
        let follow: Follow = insert_row(self.backend.as_ref(), Table::Follows, &row).await?;
        debug!("[SOCIAL] {} now follows {}", self.auth.user_id, target);
        Ok(follow)
    }

    /// Remove the edge to `target`. Returns whether one existed.
    pub async fn unfollow(&self, target: Uuid) -> Result<bool> {
        let removed = self
            .backend
            .delete(&self.edge(self.auth.user_id, target))
            .await?;
        Ok(removed > 0)
    }

    pub async fn is_following(&self, target: Uuid) -> Result<bool> {
        let query = self
            .edge(self.auth.user_id, target)
            .eq("status", FollowStatus::Accepted.as_str());
        Ok(self.backend.count(&query).await? > 0)
    }

    /// Users following `user`.
    pub async fn followers(&self, user: Uuid) -> Result<Vec<Uuid>> {
        let query = TableQuery::new(Table::Follows)
            .eq("following_id", user)
            .eq("status", FollowStatus::Accepted.as_str())
            .order("created_at", false);
        let rows: Vec<Follow> = fetch_rows(self.backend.as_ref(), &query).await?;
        Ok(rows.into_iter().map(|f| f.follower_id).collect())
    }

    /// Users `user` follows.
    pub async fn following(&self, user: Uuid) -> Result<Vec<Uuid>> {
        let query = TableQuery::new(Table::Follows)
            .eq("follower_id", user)
            .eq("status", FollowStatus::Accepted.as_str())
            .order("created_at", false);
        let rows: Vec<Follow> = fetch_rows(self.backend.as_ref(), &query).await?;
        Ok(rows.into_iter().map(|f| f.following_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    #[tokio::test]
    async fn test_follow_twice_is_rejected() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let backend = MemoryBackend::new();
        let follows = FollowService::new(AuthContext::new(me, "tok"), Arc::new(backend.clone()));

        let edge = follows.follow(other).await.unwrap();
        assert_eq!(edge.status, FollowStatus::Accepted);
        assert!(follows.is_following(other).await.unwrap());
        assert!(matches!(
            follows.follow(other).await,
            Err(VeneredLinkError::AlreadyFollowing(_))
        ));
        assert_eq!(backend.rows(Table::Follows).len(), 1);
    }

    #[tokio::test]
    async fn test_unfollow_and_lists() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let follows = FollowService::new(AuthContext::new(me, "tok"), Arc::new(MemoryBackend::new()));

        follows.follow(other).await.unwrap();
        assert_eq!(follows.following(me).await.unwrap(), vec![other]);
        assert_eq!(follows.followers(other).await.unwrap(), vec![me]);

        assert!(follows.unfollow(other).await.unwrap());
        assert!(!follows.unfollow(other).await.unwrap());
        assert!(!follows.is_following(other).await.unwrap());
    }

    #[tokio::test]
    async fn test_cannot_follow_self() {
        let me = Uuid::new_v4();
        let follows = FollowService::new(AuthContext::new(me, "tok"), Arc::new(MemoryBackend::new()));
        assert!(matches!(
            follows.follow(me).await,
            Err(VeneredLinkError::ValidationError(_))
        ));
    }
}
