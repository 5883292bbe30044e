//! Friendship is a mutual accepted follow. It is derived, never stored.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::auth::AuthContext;
use crate::backend::{fetch_rows, Backend};
use crate::error::Result;
use crate::models::{Follow, FollowStatus, ProfileSummary, Table};
use crate::table_query::TableQuery;

#[derive(Clone)]
pub struct FriendshipService {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
}

impl FriendshipService {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>) -> Self {
        Self { auth, backend }
    }

    /// True when I follow `other` and `other` follows me, both accepted.
    pub async fn is_mutual(&self, other: Uuid) -> Result<bool> {
        let me = self.auth.user_id;
        if other == me {
            return Ok(false);
        }
        let query = TableQuery::new(Table::Follows)
            .is_in("follower_id", [me, other])
            .is_in("following_id", [me, other])
            .eq("status", FollowStatus::Accepted.as_str());
        let edges: Vec<Follow> = fetch_rows(self.backend.as_ref(), &query).await?;

        let outgoing = edges.iter().any(|f| f.follower_id == me && f.following_id == other);
        let incoming = edges.iter().any(|f| f.follower_id == other && f.following_id == me);
        Ok(outgoing && incoming)
    }

    /// Profiles of users I follow who follow me back, by username.
    pub async fn friends(&self) -> Result<Vec<ProfileSummary>> {
        let me = self.auth.user_id;
        let accepted = FollowStatus::Accepted.as_str();

        let following: Vec<Follow> = fetch_rows(
            self.backend.as_ref(),
            &TableQuery::new(Table::Follows).eq("follower_id", me).eq("status", accepted),
        )
        .await?;
        let followers: HashSet<Uuid> = fetch_rows::<Follow>(
            self.backend.as_ref(),
            &TableQuery::new(Table::Follows).eq("following_id", me).eq("status", accepted),
        )
        .await?
        .into_iter()
        .map(|f| f.follower_id)
        .collect();

        let mutual: Vec<Uuid> = following
            .into_iter()
            .map(|f| f.following_id)
            .filter(|id| followers.contains(id))
            .collect();
        if mutual.is_empty() {
            return Ok(Vec::new());
        }

        let query = TableQuery::new(Table::Profiles)
            .columns(ProfileSummary::COLUMNS)
            .is_in("id", &mutual)
            .order("username", true);
        fetch_rows(self.backend.as_ref(), &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;

    fn edge(from: Uuid, to: Uuid) -> serde_json::Value {
        json!({"follower_id": from, "following_id": to, "status": "accepted"})
    }

    #[tokio::test]
    async fn test_mutual_requires_both_directions() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let backend = MemoryBackend::new();
        backend.seed_rows(Table::Follows, vec![edge(me, other)]).unwrap();

        let friendship = FriendshipService::new(AuthContext::new(me, "tok"), Arc::new(backend.clone()));
        assert!(!friendship.is_mutual(other).await.unwrap());

        backend.seed_rows(Table::Follows, vec![edge(other, me)]).unwrap();
        assert!(friendship.is_mutual(other).await.unwrap());
    }

    #[tokio::test]
    async fn test_friends_lists_mutual_profiles() {
        let me = Uuid::new_v4();
        let (ana, bo, cy) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let backend = MemoryBackend::new();
        backend
            .seed_rows(
                Table::Profiles,
                vec![
                    json!({"id": ana, "username": "ana"}),
                    json!({"id": bo, "username": "bo"}),
                    json!({"id": cy, "username": "cy"}),
                ],
            )
            .unwrap();
        backend
            .seed_rows(
                Table::Follows,
                vec![edge(me, bo), edge(bo, me), edge(me, ana), edge(ana, me), edge(me, cy)],
            )
            .unwrap();

        let friendship = FriendshipService::new(AuthContext::new(me, "tok"), Arc::new(backend));
        let names: Vec<String> = friendship
            .friends()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, vec!["ana", "bo"]);
    }
}
