//! Repository traits describing persistence adapters.
//!
//! Save operations are idempotent on their natural key and report what they
//! did through [`SaveOutcome`]. Deleting an absent row is a no-op that
//! returns `false`.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{Favorite, Follow, Like, Post, Repost, Session, User};
use crate::domain::views::{AggregateCounts, FeedEntry, FollowCounts, ViewerFlags};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
    /// The row already existed in the requested state.
    Unchanged,
}

impl SaveOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// The row as stored after an upsert, with what the upsert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saved<T> {
    pub record: T,
    pub outcome: SaveOutcome,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), RepoError>;

    async fn update_user(&self, user: &User) -> Result<(), RepoError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, RepoError>;

    /// Users for the given ids, in no particular order. Unknown ids are skipped.
    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>, RepoError>;

    async fn follow_counts(&self, user_id: Uuid) -> Result<FollowCounts, RepoError>;

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn insert_post(&self, post: &Post) -> Result<(), RepoError>;

    async fn update_post(&self, post: &Post) -> Result<(), RepoError>;

    /// Removes the post together with its likes, favorites and reposts.
    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, RepoError>;

    async fn find_posts(&self, ids: &[Uuid]) -> Result<Vec<Post>, RepoError>;

    /// Newest first.
    async fn list_posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>, RepoError>;

    /// Counts for every requested post; posts without engagement map to zero.
    async fn engagement_counts(
        &self,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AggregateCounts>, RepoError>;

    async fn viewer_flags(
        &self,
        viewer_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ViewerFlags>, RepoError>;
}

#[async_trait]
pub trait RepostsRepo: Send + Sync {
    /// Inserts, or updates the comment of the existing (author, post) repost.
    async fn save_repost(&self, repost: &Repost) -> Result<Saved<Repost>, RepoError>;

    async fn delete_repost(&self, author_id: Uuid, post_id: Uuid) -> Result<bool, RepoError>;

    async fn find_reposts(&self, ids: &[Uuid]) -> Result<Vec<Repost>, RepoError>;

    /// Newest first.
    async fn list_reposts_by_author(&self, author_id: Uuid) -> Result<Vec<Repost>, RepoError>;
}

#[async_trait]
pub trait LikesRepo: Send + Sync {
    async fn save_like(&self, like: &Like) -> Result<SaveOutcome, RepoError>;

    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait FavoritesRepo: Send + Sync {
    async fn save_favorite(&self, favorite: &Favorite) -> Result<SaveOutcome, RepoError>;

    async fn delete_favorite(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, RepoError>;

    /// Favorited post ids, most recently favorited first.
    async fn list_favorites_by_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    async fn save_follow(&self, follow: &Follow) -> Result<SaveOutcome, RepoError>;

    async fn delete_follow(&self, follower_id: Uuid, followee_id: Uuid)
    -> Result<bool, RepoError>;

    async fn list_followees(&self, follower_id: Uuid) -> Result<Vec<Uuid>, RepoError>;
}

/// Lightweight feed listing over a set of authors.
///
/// Each listing is sorted by [`crate::domain::views::feed_order`] and holds
/// at most `bound` rows.
#[async_trait]
pub trait FeedRepo: Send + Sync {
    async fn list_post_entries(
        &self,
        author_ids: &[Uuid],
        bound: u64,
    ) -> Result<Vec<FeedEntry>, RepoError>;

    async fn list_repost_entries(
        &self,
        author_ids: &[Uuid],
        bound: u64,
    ) -> Result<Vec<FeedEntry>, RepoError>;

    /// Posts plus reposts authored by anyone in `author_ids`.
    async fn count_feed_entries(&self, author_ids: &[Uuid]) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait SessionsRepo: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), RepoError>;

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, RepoError>;

    /// Persists `expire_at` and `updated_at` of an existing session.
    async fn update_session_expiry(&self, session: &Session) -> Result<bool, RepoError>;

    async fn delete_session(&self, id: Uuid) -> Result<bool, RepoError>;
}
