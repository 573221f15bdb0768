//! Likes, favorites and reposts.
//!
//! Saves are idempotent: repeating one leaves a single row and skips
//! invalidation when nothing changed.

use std::{collections::HashMap, sync::Arc};

use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::hydrate;
use crate::application::repos::{
    FavoritesRepo, LikesRepo, PostsRepo, RepostsRepo, SaveOutcome, UsersRepo,
};
use crate::cache::{CacheKey, CoherentCache, InvalidationRouter, Mutation};
use crate::domain::entities::{Engagement, Post, Repost};
use crate::domain::views::{PostSummary, PostView, RepostSummary, RepostView};

#[derive(Clone)]
pub struct EngagementService {
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
    likes: Arc<dyn LikesRepo>,
    favorites: Arc<dyn FavoritesRepo>,
    reposts: Arc<dyn RepostsRepo>,
    cache: CoherentCache,
    router: InvalidationRouter,
}

impl EngagementService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        users: Arc<dyn UsersRepo>,
        likes: Arc<dyn LikesRepo>,
        favorites: Arc<dyn FavoritesRepo>,
        reposts: Arc<dyn RepostsRepo>,
        cache: CoherentCache,
        router: InvalidationRouter,
    ) -> Self {
        Self {
            posts,
            users,
            likes,
            favorites,
            reposts,
            cache,
            router,
        }
    }

    #[instrument(skip(self))]
    pub async fn like(&self, user_id: Uuid, post_id: Uuid) -> Result<SaveOutcome, AppError> {
        let like = Engagement::new(user_id, post_id, OffsetDateTime::now_utc())?;
        self.require_post(post_id).await?;
        let outcome = self.likes.save_like(&like).await?;
        if outcome.changed() {
            self.router.route(Mutation::Liked { post_id }).await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn unlike(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, AppError> {
        let removed = self.likes.delete_like(user_id, post_id).await?;
        if removed {
            self.router.route(Mutation::Unliked { post_id }).await;
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn favorite(&self, user_id: Uuid, post_id: Uuid) -> Result<SaveOutcome, AppError> {
        let favorite = Engagement::new(user_id, post_id, OffsetDateTime::now_utc())?;
        self.require_post(post_id).await?;
        let outcome = self.favorites.save_favorite(&favorite).await?;
        if outcome.changed() {
            self.router
                .route(Mutation::Favorited { post_id, user_id })
                .await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn unfavorite(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, AppError> {
        let removed = self.favorites.delete_favorite(user_id, post_id).await?;
        if removed {
            self.router
                .route(Mutation::Unfavorited { post_id, user_id })
                .await;
        }
        Ok(removed)
    }

    /// Reposts `post_id`, or updates the comment of an existing repost.
    #[instrument(skip(self, comment))]
    pub async fn repost(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        comment: Option<&str>,
    ) -> Result<Repost, AppError> {
        let repost = Repost::new(user_id, post_id, comment, OffsetDateTime::now_utc())?;
        self.require_post(post_id).await?;
        let saved = self.reposts.save_repost(&repost).await?;
        if saved.outcome.changed() {
            self.router
                .route(Mutation::Reposted { post_id, user_id })
                .await;
        }
        Ok(saved.record)
    }

    #[instrument(skip(self))]
    pub async fn unrepost(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, AppError> {
        let removed = self.reposts.delete_repost(user_id, post_id).await?;
        if removed {
            self.router
                .route(Mutation::Unreposted { post_id, user_id })
                .await;
        }
        Ok(removed)
    }

    /// The user's reposts, newest first, each with its target post.
    #[instrument(skip(self))]
    pub async fn list_reposts(
        &self,
        user_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Vec<RepostView>, AppError> {
        let summaries: Vec<RepostSummary> = self
            .cache
            .read_through(&CacheKey::UserReposts(user_id), || {
                self.load_repost_summaries(user_id)
            })
            .await?;

        let (reposts, posts): (Vec<Repost>, Vec<PostSummary>) = summaries
            .into_iter()
            .map(|summary| (summary.repost, summary.post))
            .unzip();
        let views = hydrate::engage(self.posts.as_ref(), viewer, posts).await?;
        Ok(reposts
            .into_iter()
            .zip(views)
            .map(|(repost, post)| RepostView { repost, post })
            .collect())
    }

    /// Posts the user favorited, most recent favorite first.
    #[instrument(skip(self))]
    pub async fn list_favorites(
        &self,
        user_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Vec<PostView>, AppError> {
        let summaries: Vec<PostSummary> = self
            .cache
            .read_through(&CacheKey::UserFavorites(user_id), || async {
                let ids = self.favorites.list_favorites_by_user(user_id).await?;
                let posts = self.posts_in_order(&ids).await?;
                Ok::<_, AppError>(hydrate::summarize(self.users.as_ref(), posts).await?)
            })
            .await?;
        Ok(hydrate::engage(self.posts.as_ref(), viewer, summaries).await?)
    }

    async fn require_post(&self, post_id: Uuid) -> Result<(), AppError> {
        match self.posts.find_post(post_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("post")),
        }
    }

    async fn posts_in_order(&self, ids: &[Uuid]) -> Result<Vec<Post>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut by_id: HashMap<Uuid, Post> = self
            .posts
            .find_posts(ids)
            .await?
            .into_iter()
            .map(|post| (post.id(), post))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn load_repost_summaries(&self, user_id: Uuid) -> Result<Vec<RepostSummary>, AppError> {
        let reposts = self.reposts.list_reposts_by_author(user_id).await?;
        let post_ids: Vec<Uuid> = reposts.iter().map(|repost| repost.post_id).collect();
        let posts = self.posts_in_order(&hydrate::unique(post_ids)).await?;
        let summaries: HashMap<Uuid, PostSummary> = hydrate::summarize(self.users.as_ref(), posts)
            .await?
            .into_iter()
            .map(|summary| (summary.post.id(), summary))
            .collect();
        Ok(reposts
            .into_iter()
            .filter_map(|repost| {
                let post = summaries.get(&repost.post_id)?.clone();
                Some(RepostSummary { repost, post })
            })
            .collect())
    }
}
