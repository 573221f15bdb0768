use std::sync::Arc;

use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{FollowsRepo, SaveOutcome, UsersRepo};
use crate::cache::{InvalidationRouter, Mutation};
use crate::domain::entities::Follow;
use crate::domain::error::DomainError;

#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
    router: InvalidationRouter,
}

impl FollowService {
    pub fn new(
        follows: Arc<dyn FollowsRepo>,
        users: Arc<dyn UsersRepo>,
        router: InvalidationRouter,
    ) -> Self {
        Self {
            follows,
            users,
            router,
        }
    }

    /// Self-follows fail validation before any repository or cache access.
    #[instrument(skip(self))]
    pub async fn follow(
        &self,
        follower_id: Uuid,
        followee_id: Uuid,
    ) -> Result<SaveOutcome, AppError> {
        let follow = Follow::new(follower_id, followee_id, OffsetDateTime::now_utc())?;
        if self.users.find_user_by_id(followee_id).await?.is_none() {
            return Err(AppError::not_found("user"));
        }
        let outcome = self.follows.save_follow(&follow).await?;
        if outcome.changed() {
            self.router
                .route(Mutation::Followed {
                    follower_id,
                    followee_id,
                })
                .await;
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, AppError> {
        if follower_id == followee_id {
            return Err(
                DomainError::validation("followee_id", "users cannot unfollow themselves").into(),
            );
        }
        let removed = self.follows.delete_follow(follower_id, followee_id).await?;
        if removed {
            self.router
                .route(Mutation::Unfollowed {
                    follower_id,
                    followee_id,
                })
                .await;
        }
        Ok(removed)
    }

    pub async fn followees(&self, follower_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self.follows.list_followees(follower_id).await?)
    }
}
