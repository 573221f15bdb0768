use std::sync::Arc;

use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::UsersRepo;
use crate::cache::{CacheKey, CoherentCache, InvalidationRouter, Mutation};
use crate::domain::entities::User;
use crate::domain::password::PasswordHash;
use crate::domain::views::{UserProfile, UserSnapshot, UserView};

/// Fields a profile update may change. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<PasswordHash>,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UsersRepo>,
    cache: CoherentCache,
    router: InvalidationRouter,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        cache: CoherentCache,
        router: InvalidationRouter,
    ) -> Self {
        Self {
            users,
            cache,
            router,
        }
    }

    #[instrument(skip(self, email, password))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: PasswordHash,
    ) -> Result<User, AppError> {
        let user = User::new(username, email, password, OffsetDateTime::now_utc())?;
        if self.users.find_user_by_name(&user.username).await?.is_some() {
            return Err(AppError::validation("username is already taken"));
        }
        self.users.insert_user(&user).await?;
        Ok(user)
    }

    /// Public profile with follow counts; `followed` is computed for `viewer`.
    #[instrument(skip(self))]
    pub async fn get_user(
        &self,
        user_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<UserView, AppError> {
        let snapshot: UserSnapshot = self
            .cache
            .read_through(&CacheKey::User(user_id), || async {
                let user = self
                    .users
                    .find_user_by_id(user_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("user"))?;
                let counts = self.users.follow_counts(user_id).await?;
                Ok::<_, AppError>(UserSnapshot {
                    profile: UserProfile::from(&user),
                    counts,
                })
            })
            .await?;

        let followed = match viewer {
            Some(viewer) if viewer != user_id => self.users.is_following(viewer, user_id).await?,
            _ => false,
        };
        Ok(UserView {
            profile: snapshot.profile,
            counts: snapshot.counts,
            followed,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_name(&self, username: &str) -> Result<UserProfile, AppError> {
        let username = username.trim();
        self.cache
            .read_through(&CacheKey::UserByName(username.to_string()), || async {
                let user = self
                    .users
                    .find_user_by_name(username)
                    .await?
                    .ok_or_else(|| AppError::not_found("user"))?;
                Ok::<_, AppError>(UserProfile::from(&user))
            })
            .await
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<User, AppError> {
        let mut user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;
        let old_username = user.username.clone();
        let now = OffsetDateTime::now_utc();

        if let Some(username) = update.username.as_deref() {
            user.rename(username, now)?;
            if user.username != old_username
                && self.users.find_user_by_name(&user.username).await?.is_some()
            {
                return Err(AppError::validation("username is already taken"));
            }
        }
        if let Some(email) = update.email.as_deref() {
            user.change_email(email, now)?;
        }
        if let Some(password) = update.password {
            user.change_password(password, now)?;
        }

        self.users.update_user(&user).await?;
        self.router
            .route(Mutation::UserUpdated {
                user_id,
                old_username,
                new_username: user.username.clone(),
            })
            .await;
        Ok(user)
    }
}
