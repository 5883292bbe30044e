//! Posts, likes, comments and profile search.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::backend::{fetch_optional, fetch_rows, insert_row, Backend};
use crate::error::{Result, VeneredLinkError};
use crate::models::{Comment, Like, Post, ProfileSummary, Table};
use crate::table_query::TableQuery;

/// Search results per query.
pub const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
struct NewPost<'a> {
    user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    image_urls: &'a [String],
}

#[derive(Debug, Serialize)]
struct NewLike {
    post_id: Uuid,
    user_id: Uuid,
}

#[derive(Debug, Serialize)]
struct NewComment<'a> {
    post_id: Uuid,
    user_id: Uuid,
    content: &'a str,
}

#[derive(Deserialize)]
struct LikedPost {
    post_id: Uuid,
}

#[derive(Clone)]
pub struct PostService {
    auth: AuthContext,
    backend: Arc<dyn Backend>,
}

impl PostService {
    pub fn new(auth: AuthContext, backend: Arc<dyn Backend>) -> Self {
        Self { auth, backend }
    }

    fn own_post(&self, post: Uuid) -> TableQuery {
        TableQuery::new(Table::Posts)
            .eq("id", post)
            .eq("user_id", self.auth.user_id)
    }

    fn my_like(&self, post: Uuid) -> TableQuery {
        TableQuery::new(Table::Likes)
            .eq("post_id", post)
            .eq("user_id", self.auth.user_id)
    }

    /// Publish a post. Text is trimmed; a post needs text or at least one image.
    pub async fn create(&self, content: &str, image_urls: &[String]) -> Result<Post> {
        let content = Some(content.trim()).filter(|c| !c.is_empty());
        if content.is_none() && image_urls.is_empty() {
            return Err(VeneredLinkError::ValidationError(
                "a post needs text or an image".into(),
            ));
        }
        let row = NewPost {
            user_id: self.auth.user_id,
            content,
            image_urls,
        };
        let post: Post = insert_row(self.backend.as_ref(), Table::Posts, &row).await?;
        debug!("[SOCIAL] {} published post {}", self.auth.user_id, post.id);
        Ok(post)
    }

    /// Delete one of my posts. Returns whether it existed and was mine.
    pub async fn delete(&self, post: Uuid) -> Result<bool> {
        Ok(self.backend.delete(&self.own_post(post)).await? > 0)
    }

    /// Change who can see one of my posts.
    pub async fn set_private(&self, post: Uuid, is_private: bool) -> Result<Post> {
        let rows = self
            .backend
            .update(&self.own_post(post), json!({ "is_private": is_private }))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(serde_json::from_value(row)?),
            None => Err(VeneredLinkError::PermissionDenied(format!(
                "post {} does not belong to {}",
                post, self.auth.user_id
            ))),
        }
    }

    /// Latest posts from everyone, newest first.
    pub async fn timeline(&self, limit: usize) -> Result<Vec<Post>> {
        let query = TableQuery::new(Table::Posts)
            .order("created_at", false)
            .limit(limit);
        fetch_rows(self.backend.as_ref(), &query).await
    }

    /// Posts by `user`, newest first.
    pub async fn by_user(&self, user: Uuid) -> Result<Vec<Post>> {
        let query = TableQuery::new(Table::Posts)
            .eq("user_id", user)
            .order("created_at", false);
        fetch_rows(self.backend.as_ref(), &query).await
    }

    pub async fn is_liked(&self, post: Uuid) -> Result<bool> {
        Ok(self.backend.count(&self.my_like(post)).await? > 0)
    }

    /// Like `post`. Returns false when it was already liked.
    pub async fn like(&self, post: Uuid) -> Result<bool> {
        let existing: Option<Like> =
            fetch_optional(self.backend.as_ref(), self.my_like(post)).await?;
        if existing.is_some() {
            return Ok(false);
        }
        let row = NewLike {
            post_id: post,
            user_id: self.auth.user_id,
        };
        let _: Like = insert_row(self.backend.as_ref(), Table::Likes, &row).await?;
        Ok(true)
    }

    /// Returns false when there was no like to remove.
    pub async fn unlike(&self, post: Uuid) -> Result<bool> {
        Ok(self.backend.delete(&self.my_like(post)).await? > 0)
    }

    /// Flip my like on `post`; returns whether it is liked afterwards.
    pub async fn toggle_like(&self, post: Uuid) -> Result<bool> {
        if self.unlike(post).await? {
            Ok(false)
        } else {
            self.like(post).await?;
            Ok(true)
        }
    }

    pub async fn like_count(&self, post: Uuid) -> Result<u64> {
        self.backend
            .count(&TableQuery::new(Table::Likes).eq("post_id", post))
            .await
    }

    /// Which of `posts` I have liked, in one round trip.
    pub async fn liked_among(&self, posts: &[Uuid]) -> Result<HashSet<Uuid>> {
        if posts.is_empty() {
            return Ok(HashSet::new());
        }
        let query = TableQuery::new(Table::Likes)
            .columns(&["post_id"])
            .eq("user_id", self.auth.user_id)
            .is_in("post_id", posts);
        let rows: Vec<LikedPost> = fetch_rows(self.backend.as_ref(), &query).await?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    /// Comments on `post`, oldest first.
    pub async fn comments(&self, post: Uuid) -> Result<Vec<Comment>> {
        let query = TableQuery::new(Table::Comments)
            .eq("post_id", post)
            .order("created_at", true);
        fetch_rows(self.backend.as_ref(), &query).await
    }

    pub async fn add_comment(&self, post: Uuid, content: &str) -> Result<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(VeneredLinkError::ValidationError("comment is empty".into()));
        }
        let row = NewComment {
            post_id: post,
            user_id: self.auth.user_id,
            content,
        };
        let comment: Comment = insert_row(self.backend.as_ref(), Table::Comments, &row).await?;
        debug!("[SOCIAL] {} commented on post {}", self.auth.user_id, post);
        Ok(comment)
    }

    /// Profiles whose username or full name contains `term`. A blank term
    /// matches nobody and skips the round trip.
    pub async fn search_profiles(&self, term: &str) -> Result<Vec<ProfileSummary>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let query = TableQuery::new(Table::Profiles)
            .columns(ProfileSummary::COLUMNS)
            .contains(&["username", "full_name"], term)
            .limit(SEARCH_LIMIT);
        fetch_rows(self.backend.as_ref(), &query).await
    }
}
