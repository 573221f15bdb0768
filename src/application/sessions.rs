use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{SessionsRepo, UsersRepo};
use crate::cache::{CacheKey, CoherentCache, InvalidationRouter, Lookup, Mutation};
use crate::domain::entities::Session;

/// Sessions are cached only while live. An expired entry found in the cache
/// is evicted, and an expired session is rejected on lookup.
#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionsRepo>,
    users: Arc<dyn UsersRepo>,
    cache: CoherentCache,
    router: InvalidationRouter,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionsRepo>,
        users: Arc<dyn UsersRepo>,
        cache: CoherentCache,
        router: InvalidationRouter,
    ) -> Self {
        Self {
            sessions,
            users,
            cache,
            router,
        }
    }

    #[instrument(skip(self))]
    pub async fn create(
        &self,
        user_id: Uuid,
        expire_at: OffsetDateTime,
    ) -> Result<Session, AppError> {
        let session = Session::new(user_id, expire_at, OffsetDateTime::now_utc())?;
        if self.users.find_user_by_id(user_id).await?.is_none() {
            return Err(AppError::not_found("user"));
        }
        self.sessions.insert_session(&session).await?;
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, session_id: Uuid) -> Result<Session, AppError> {
        let key = CacheKey::Session(session_id);
        let now = OffsetDateTime::now_utc();

        if let Lookup::Hit(session) = self.cache.get::<Session>(&key).await {
            if !session.is_expired(now) {
                return Ok(session);
            }
            debug!(session_id = %session_id, "evicting expired session from cache");
            if let Err(err) = self.cache.delete(&key).await {
                warn!(session_id = %session_id, error = %err, "expired session eviction failed");
            }
        }

        let session = self
            .sessions
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("session"))?;
        if session.is_expired(now) {
            return Err(AppError::validation("session has expired"));
        }
        self.cache.set(&key, &session).await;
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn update_expiry(
        &self,
        session_id: Uuid,
        expire_at: OffsetDateTime,
    ) -> Result<Session, AppError> {
        let mut session = self
            .sessions
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("session"))?;
        session.extend(expire_at, OffsetDateTime::now_utc())?;
        if !self.sessions.update_session_expiry(&session).await? {
            return Err(AppError::not_found("session"));
        }
        self.router
            .route(Mutation::SessionExpiryUpdated { session_id })
            .await;
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, session_id: Uuid) -> Result<bool, AppError> {
        let removed = self.sessions.delete_session(session_id).await?;
        self.router
            .route(Mutation::SessionDeleted { session_id })
            .await;
        Ok(removed)
    }
}
