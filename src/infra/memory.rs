//! In-process repositories backed by hash maps.
//!
//! Used by the `feed --in-memory` command and by tests. Uniqueness and
//! foreign-key rules mirror the Postgres schema so services behave the same
//! against either adapter.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{
    FavoritesRepo, FeedRepo, FollowsRepo, LikesRepo, PostsRepo, RepoError, RepostsRepo,
    SaveOutcome, Saved, SessionsRepo, UsersRepo,
};
use crate::cache::{rw_read, rw_write};
use crate::domain::entities::{Favorite, Follow, Like, Post, Repost, Session, User};
use crate::domain::views::{
    AggregateCounts, FeedEntry, FeedEntryKind, FollowCounts, ViewerFlags, feed_order,
};

const SOURCE: &str = "infra::memory";

type Pair = (Uuid, Uuid);

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    posts: HashMap<Uuid, Post>,
    reposts: HashMap<Uuid, Repost>,
    likes: HashMap<Pair, Like>,
    favorites: HashMap<Pair, Favorite>,
    follows: HashMap<Pair, Follow>,
    sessions: HashMap<Uuid, Session>,
}

impl State {
    fn require_user(&self, id: Uuid) -> Result<(), RepoError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::InvalidInput {
                message: format!("user {id} does not exist"),
            })
        }
    }

    fn require_post(&self, id: Uuid) -> Result<(), RepoError> {
        if self.posts.contains_key(&id) {
            Ok(())
        } else {
            Err(RepoError::InvalidInput {
                message: format!("post {id} does not exist"),
            })
        }
    }

    fn username_taken(&self, username: &str, except: Uuid) -> bool {
        self.users
            .values()
            .any(|user| user.username == username && user.meta.id != except)
    }
}

fn bounded(mut entries: Vec<FeedEntry>, bound: u64) -> Vec<FeedEntry> {
    entries.sort_by(feed_order);
    entries.truncate(usize::try_from(bound).unwrap_or(usize::MAX));
    entries
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (time::OffsetDateTime, Uuid)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[derive(Default)]
pub struct InMemoryRepositories {
    state: RwLock<State>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, op: &'static str) -> std::sync::RwLockReadGuard<'_, State> {
        rw_read(&self.state, SOURCE, op)
    }

    fn write(&self, op: &'static str) -> std::sync::RwLockWriteGuard<'_, State> {
        rw_write(&self.state, SOURCE, op)
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn insert_user(&self, user: &User) -> Result<(), RepoError> {
        let mut state = self.write("insert_user");
        if state.users.contains_key(&user.meta.id) {
            return Err(RepoError::Duplicate {
                constraint: "users_pkey".to_string(),
            });
        }
        if state.username_taken(&user.username, user.meta.id) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        state.users.insert(user.meta.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), RepoError> {
        let mut state = self.write("update_user");
        if !state.users.contains_key(&user.meta.id) {
            return Err(RepoError::NotFound);
        }
        if state.username_taken(&user.username, user.meta.id) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        state.users.insert(user.meta.id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.read("find_user_by_id").users.get(&id).cloned())
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .read("find_user_by_name")
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_users(&self, ids: &[Uuid]) -> Result<Vec<User>, RepoError> {
        let state = self.read("find_users");
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn follow_counts(&self, user_id: Uuid) -> Result<FollowCounts, RepoError> {
        let state = self.read("follow_counts");
        let followers = state
            .follows
            .keys()
            .filter(|(_, followee)| *followee == user_id)
            .count();
        let following = state
            .follows
            .keys()
            .filter(|(follower, _)| *follower == user_id)
            .count();
        Ok(FollowCounts {
            followers: followers as u64,
            following: following as u64,
        })
    }

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .read("is_following")
            .follows
            .contains_key(&(follower_id, followee_id)))
    }
}

#[async_trait]
impl PostsRepo for InMemoryRepositories {
    async fn insert_post(&self, post: &Post) -> Result<(), RepoError> {
        let mut state = self.write("insert_post");
        state.require_user(post.author_id)?;
        if state.posts.contains_key(&post.meta.id) {
            return Err(RepoError::Duplicate {
                constraint: "posts_pkey".to_string(),
            });
        }
        state.posts.insert(post.meta.id, post.clone());
        Ok(())
    }

    async fn update_post(&self, post: &Post) -> Result<(), RepoError> {
        let mut state = self.write("update_post");
        match state.posts.get_mut(&post.meta.id) {
            Some(stored) => {
                stored.content = post.content.clone();
                stored.meta.updated_at = post.meta.updated_at;
                Ok(())
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.write("delete_post");
        if state.posts.remove(&id).is_none() {
            return Ok(false);
        }
        state.likes.retain(|(_, post_id), _| *post_id != id);
        state.favorites.retain(|(_, post_id), _| *post_id != id);
        state.reposts.retain(|_, repost| repost.post_id != id);
        Ok(true)
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        Ok(self.read("find_post").posts.get(&id).cloned())
    }

    async fn find_posts(&self, ids: &[Uuid]) -> Result<Vec<Post>, RepoError> {
        let state = self.read("find_posts");
        Ok(ids
            .iter()
            .filter_map(|id| state.posts.get(id).cloned())
            .collect())
    }

    async fn list_posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>, RepoError> {
        let mut posts: Vec<Post> = self
            .read("list_posts_by_author")
            .posts
            .values()
            .filter(|post| post.author_id == author_id)
            .cloned()
            .collect();
        newest_first(&mut posts, |post| (post.meta.created_at, post.meta.id));
        Ok(posts)
    }

    async fn engagement_counts(
        &self,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AggregateCounts>, RepoError> {
        let state = self.read("engagement_counts");
        Ok(post_ids
            .iter()
            .map(|id| {
                let counts = AggregateCounts {
                    like_count: state.likes.keys().filter(|(_, p)| p == id).count() as u64,
                    favorite_count: state.favorites.keys().filter(|(_, p)| p == id).count()
                        as u64,
                    repost_count: state.reposts.values().filter(|r| r.post_id == *id).count()
                        as u64,
                };
                (*id, counts)
            })
            .collect())
    }

    async fn viewer_flags(
        &self,
        viewer_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ViewerFlags>, RepoError> {
        let state = self.read("viewer_flags");
        Ok(post_ids
            .iter()
            .filter(|id| state.posts.contains_key(id))
            .map(|id| {
                let flags = ViewerFlags {
                    liked: state.likes.contains_key(&(viewer_id, *id)),
                    favorited: state.favorites.contains_key(&(viewer_id, *id)),
                    reposted: state
                        .reposts
                        .values()
                        .any(|r| r.author_id == viewer_id && r.post_id == *id),
                };
                (*id, flags)
            })
            .collect())
    }
}

#[async_trait]
impl RepostsRepo for InMemoryRepositories {
    async fn save_repost(&self, repost: &Repost) -> Result<Saved<Repost>, RepoError> {
        let mut state = self.write("save_repost");
        state.require_user(repost.author_id)?;
        state.require_post(repost.post_id)?;

        let existing = state
            .reposts
            .values_mut()
            .find(|r| r.author_id == repost.author_id && r.post_id == repost.post_id);
        if let Some(stored) = existing {
            if stored.comment == repost.comment {
                return Ok(Saved {
                    record: stored.clone(),
                    outcome: SaveOutcome::Unchanged,
                });
            }
            stored
                .update_comment(repost.comment.as_deref(), repost.meta.updated_at)
                .map_err(|err| RepoError::InvalidInput {
                    message: err.to_string(),
                })?;
            return Ok(Saved {
                record: stored.clone(),
                outcome: SaveOutcome::Updated,
            });
        }

        state.reposts.insert(repost.meta.id, repost.clone());
        Ok(Saved {
            record: repost.clone(),
            outcome: SaveOutcome::Created,
        })
    }

    async fn delete_repost(&self, author_id: Uuid, post_id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.write("delete_repost");
        let before = state.reposts.len();
        state
            .reposts
            .retain(|_, r| !(r.author_id == author_id && r.post_id == post_id));
        Ok(state.reposts.len() < before)
    }

    async fn find_reposts(&self, ids: &[Uuid]) -> Result<Vec<Repost>, RepoError> {
        let state = self.read("find_reposts");
        Ok(ids
            .iter()
            .filter_map(|id| state.reposts.get(id).cloned())
            .collect())
    }

    async fn list_reposts_by_author(&self, author_id: Uuid) -> Result<Vec<Repost>, RepoError> {
        let mut reposts: Vec<Repost> = self
            .read("list_reposts_by_author")
            .reposts
            .values()
            .filter(|r| r.author_id == author_id)
            .cloned()
            .collect();
        newest_first(&mut reposts, |r| (r.meta.created_at, r.meta.id));
        Ok(reposts)
    }
}

#[async_trait]
impl LikesRepo for InMemoryRepositories {
    async fn save_like(&self, like: &Like) -> Result<SaveOutcome, RepoError> {
        let mut state = self.write("save_like");
        state.require_user(like.user_id)?;
        state.require_post(like.post_id)?;
        let key = (like.user_id, like.post_id);
        if state.likes.contains_key(&key) {
            return Ok(SaveOutcome::Unchanged);
        }
        state.likes.insert(key, *like);
        Ok(SaveOutcome::Created)
    }

    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .write("delete_like")
            .likes
            .remove(&(user_id, post_id))
            .is_some())
    }
}

#[async_trait]
impl FavoritesRepo for InMemoryRepositories {
    async fn save_favorite(&self, favorite: &Favorite) -> Result<SaveOutcome, RepoError> {
        let mut state = self.write("save_favorite");
        state.require_user(favorite.user_id)?;
        state.require_post(favorite.post_id)?;
        let key = (favorite.user_id, favorite.post_id);
        if state.favorites.contains_key(&key) {
            return Ok(SaveOutcome::Unchanged);
        }
        state.favorites.insert(key, *favorite);
        Ok(SaveOutcome::Created)
    }

    async fn delete_favorite(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .write("delete_favorite")
            .favorites
            .remove(&(user_id, post_id))
            .is_some())
    }

    async fn list_favorites_by_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let mut favorites: Vec<Favorite> = self
            .read("list_favorites_by_user")
            .favorites
            .values()
            .filter(|f| f.user_id == user_id)
            .copied()
            .collect();
        newest_first(&mut favorites, |f| (f.meta.created_at, f.meta.id));
        Ok(favorites.into_iter().map(|f| f.post_id).collect())
    }
}

#[async_trait]
impl FollowsRepo for InMemoryRepositories {
    async fn save_follow(&self, follow: &Follow) -> Result<SaveOutcome, RepoError> {
        let mut state = self.write("save_follow");
        state.require_user(follow.follower_id)?;
        state.require_user(follow.followee_id)?;
        let key = (follow.follower_id, follow.followee_id);
        if state.follows.contains_key(&key) {
            return Ok(SaveOutcome::Unchanged);
        }
        state.follows.insert(key, *follow);
        Ok(SaveOutcome::Created)
    }

    async fn delete_follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> Result<bool, RepoError> {
        Ok(self
            .write("delete_follow")
            .follows
            .remove(&(follower_id, followee_id))
            .is_some())
    }

    async fn list_followees(&self, follower_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let mut follows: Vec<Follow> = self
            .read("list_followees")
            .follows
            .values()
            .filter(|f| f.follower_id == follower_id)
            .copied()
            .collect();
        newest_first(&mut follows, |f| (f.meta.created_at, f.followee_id));
        Ok(follows.into_iter().map(|f| f.followee_id).collect())
    }
}

#[async_trait]
impl FeedRepo for InMemoryRepositories {
    async fn list_post_entries(
        &self,
        author_ids: &[Uuid],
        bound: u64,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        let state = self.read("list_post_entries");
        let entries = state
            .posts
            .values()
            .filter(|post| author_ids.contains(&post.author_id))
            .map(|post| FeedEntry {
                kind: FeedEntryKind::Original,
                id: post.meta.id,
                post_id: post.meta.id,
                author_id: post.author_id,
                activity_time: post.meta.created_at,
            })
            .collect();
        Ok(bounded(entries, bound))
    }

    async fn list_repost_entries(
        &self,
        author_ids: &[Uuid],
        bound: u64,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        let state = self.read("list_repost_entries");
        let entries = state
            .reposts
            .values()
            .filter(|repost| author_ids.contains(&repost.author_id))
            .map(|repost| FeedEntry {
                kind: FeedEntryKind::Repost,
                id: repost.meta.id,
                post_id: repost.post_id,
                author_id: repost.author_id,
                activity_time: repost.meta.created_at,
            })
            .collect();
        Ok(bounded(entries, bound))
    }

    async fn count_feed_entries(&self, author_ids: &[Uuid]) -> Result<u64, RepoError> {
        let state = self.read("count_feed_entries");
        let posts = state
            .posts
            .values()
            .filter(|post| author_ids.contains(&post.author_id))
            .count();
        let reposts = state
            .reposts
            .values()
            .filter(|repost| author_ids.contains(&repost.author_id))
            .count();
        Ok((posts + reposts) as u64)
    }
}

#[async_trait]
impl SessionsRepo for InMemoryRepositories {
    async fn insert_session(&self, session: &Session) -> Result<(), RepoError> {
        let mut state = self.write("insert_session");
        state.require_user(session.user_id)?;
        if state.sessions.contains_key(&session.meta.id) {
            return Err(RepoError::Duplicate {
                constraint: "sessions_pkey".to_string(),
            });
        }
        state.sessions.insert(session.meta.id, *session);
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, RepoError> {
        Ok(self.read("find_session").sessions.get(&id).copied())
    }

    async fn update_session_expiry(&self, session: &Session) -> Result<bool, RepoError> {
        let mut state = self.write("update_session_expiry");
        match state.sessions.get_mut(&session.meta.id) {
            Some(stored) => {
                stored.expire_at = session.expire_at;
                stored.meta.updated_at = session.meta.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.write("delete_session").sessions.remove(&id).is_some())
    }
}
