//! Derived read models.
//!
//! Types suffixed `Snapshot` or `Summary` are viewer-independent and may be
//! cached. Types carrying [`ViewerFlags`] or a `followed` flag are built per
//! request and never cached.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{Post, Repost, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub username: String,
}

impl From<&User> for AuthorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub like_count: u64,
    pub favorite_count: u64,
    pub repost_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerFlags {
    pub liked: bool,
    pub favorited: bool,
    pub reposted: bool,
}

/// A post with its author, without counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub post: Post,
    pub author: AuthorSummary,
}

impl PostSummary {
    pub fn with_engagement(self, counts: AggregateCounts, flags: ViewerFlags) -> PostView {
        PostView {
            post: self.post,
            author: self.author,
            counts,
            flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub post: Post,
    pub author: AuthorSummary,
    pub counts: AggregateCounts,
}

impl PostSnapshot {
    pub fn with_flags(self, flags: ViewerFlags) -> PostView {
        PostView {
            post: self.post,
            author: self.author,
            counts: self.counts,
            flags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    pub post: Post,
    pub author: AuthorSummary,
    pub counts: AggregateCounts,
    pub flags: ViewerFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostSummary {
    pub repost: Repost,
    pub post: PostSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepostView {
    pub repost: Repost,
    pub post: PostView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedActivity {
    Original {
        post: PostSummary,
    },
    Repost {
        post: PostSummary,
        repost: Repost,
        repost_author: AuthorSummary,
    },
}

impl FeedActivity {
    pub fn post_id(&self) -> Uuid {
        match self {
            Self::Original { post } | Self::Repost { post, .. } => post.post.id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItemSnapshot {
    pub activity: FeedActivity,
    pub counts: AggregateCounts,
    #[serde(with = "time::serde::rfc3339")]
    pub activity_time: OffsetDateTime,
}

impl FeedItemSnapshot {
    pub fn with_flags(self, flags: ViewerFlags) -> FeedItem {
        FeedItem {
            activity: self.activity,
            counts: self.counts,
            flags,
            activity_time: self.activity_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub items: Vec<FeedItemSnapshot>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub activity: FeedActivity,
    pub counts: AggregateCounts,
    pub flags: ViewerFlags,
    #[serde(with = "time::serde::rfc3339")]
    pub activity_time: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            username: user.username.clone(),
            created_at: user.meta.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowCounts {
    pub followers: u64,
    pub following: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub profile: UserProfile,
    pub counts: FollowCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub profile: UserProfile,
    pub counts: FollowCounts,
    pub followed: bool,
}

/// Reposts sort ahead of originals at equal activity time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEntryKind {
    Repost,
    Original,
}

/// Lightweight feed row produced before hydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedEntry {
    pub kind: FeedEntryKind,
    /// Post id for originals, repost id for reposts.
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub activity_time: OffsetDateTime,
}

/// Total feed order: newest first, reposts before originals, then id descending.
pub fn feed_order(a: &FeedEntry, b: &FeedEntry) -> Ordering {
    b.activity_time
        .cmp(&a.activity_time)
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| b.id.cmp(&a.id))
}
