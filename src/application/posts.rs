use std::sync::Arc;

use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::hydrate;
use crate::application::repos::{PostsRepo, UsersRepo};
use crate::cache::{CacheKey, CoherentCache, InvalidationRouter, Mutation};
use crate::domain::entities::Post;
use crate::domain::views::{PostSnapshot, PostSummary, PostView};

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
    cache: CoherentCache,
    router: InvalidationRouter,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        users: Arc<dyn UsersRepo>,
        cache: CoherentCache,
        router: InvalidationRouter,
    ) -> Self {
        Self {
            posts,
            users,
            cache,
            router,
        }
    }

    #[instrument(skip(self, content))]
    pub async fn create_post(&self, author_id: Uuid, content: &str) -> Result<Post, AppError> {
        let post = Post::new(author_id, content, OffsetDateTime::now_utc())?;
        if self.users.find_user_by_id(author_id).await?.is_none() {
            return Err(AppError::not_found("user"));
        }
        self.posts.insert_post(&post).await?;
        self.router.route(Mutation::PostCreated { author_id }).await;
        Ok(post)
    }

    #[instrument(skip(self, content))]
    pub async fn update_post(
        &self,
        actor_id: Uuid,
        post_id: Uuid,
        content: &str,
    ) -> Result<Post, AppError> {
        let mut post = self.owned_post(actor_id, post_id).await?;
        post.edit(content, OffsetDateTime::now_utc())?;
        self.posts.update_post(&post).await?;
        self.router
            .route(Mutation::PostUpdated {
                post_id,
                author_id: post.author_id,
            })
            .await;
        Ok(post)
    }

    #[instrument(skip(self))]
    pub async fn delete_post(&self, actor_id: Uuid, post_id: Uuid) -> Result<(), AppError> {
        let post = self.owned_post(actor_id, post_id).await?;
        self.posts.delete_post(post_id).await?;
        self.router
            .route(Mutation::PostDeleted {
                post_id,
                author_id: post.author_id,
            })
            .await;
        Ok(())
    }

    /// Post with counts, plus flags for `viewer` when present.
    #[instrument(skip(self))]
    pub async fn get_post(
        &self,
        post_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<PostView, AppError> {
        let snapshot = self
            .cache
            .read_through(&CacheKey::Post(post_id), || self.load_snapshot(post_id))
            .await?;
        let flags = hydrate::flags(self.posts.as_ref(), viewer, &[post_id]).await?;
        let flags = flags.get(&post_id).copied().unwrap_or_default();
        Ok(snapshot.with_flags(flags))
    }

    /// The author's posts, newest first, with fresh counts and flags.
    #[instrument(skip(self))]
    pub async fn list_user_posts(
        &self,
        author_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Vec<PostView>, AppError> {
        let summaries: Vec<PostSummary> = self
            .cache
            .read_through(&CacheKey::UserPosts(author_id), || async {
                let posts = self.posts.list_posts_by_author(author_id).await?;
                Ok::<_, AppError>(hydrate::summarize(self.users.as_ref(), posts).await?)
            })
            .await?;
        Ok(hydrate::engage(self.posts.as_ref(), viewer, summaries).await?)
    }

    async fn owned_post(&self, actor_id: Uuid, post_id: Uuid) -> Result<Post, AppError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post"))?;
        if post.author_id != actor_id {
            return Err(AppError::forbidden("post belongs to another user"));
        }
        Ok(post)
    }

    async fn load_snapshot(&self, post_id: Uuid) -> Result<PostSnapshot, AppError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post"))?;
        let author = self
            .users
            .find_user_by_id(post.author_id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;
        let counts = self
            .posts
            .engagement_counts(&[post_id])
            .await?
            .remove(&post_id)
            .unwrap_or_default();
        Ok(PostSnapshot {
            author: (&author).into(),
            post,
            counts,
        })
    }
}
