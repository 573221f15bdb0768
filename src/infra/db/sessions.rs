use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, SessionsRepo};
use crate::domain::entities::{EntityMeta, Session};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    expire_at: OffsetDateTime,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<SessionRow> for Session {
    type Error = RepoError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let meta = EntityMeta::restore(row.id, row.created_at, row.updated_at)
            .map_err(|err| RepoError::integrity(err.to_string()))?;
        Ok(Self {
            meta,
            user_id: row.user_id,
            expire_at: row.expire_at,
        })
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn insert_session(&self, session: &Session) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, expire_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.meta.id)
        .bind(session.user_id)
        .bind(session.expire_at)
        .bind(session.meta.created_at)
        .bind(session.meta.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, expire_at, created_at, updated_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        row.map(Session::try_from).transpose()
    }

    async fn update_session_expiry(&self, session: &Session) -> Result<bool, RepoError> {
        let result =
            sqlx::query("UPDATE sessions SET expire_at = $2, updated_at = $3 WHERE id = $1")
                .bind(session.meta.id)
                .bind(session.expire_at)
                .bind(session.meta.updated_at)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
