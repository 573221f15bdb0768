use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    FavoritesRepo, LikesRepo, RepoError, RepostsRepo, SaveOutcome, Saved,
};
use crate::domain::entities::{EntityMeta, Favorite, Like, Repost};

use super::util::insert_outcome;
use super::{PostgresRepositories, map_sqlx_error};

#[derive(FromRow)]
struct RepostRow {
    id: Uuid,
    author_id: Uuid,
    post_id: Uuid,
    comment: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<RepostRow> for Repost {
    type Error = RepoError;

    fn try_from(row: RepostRow) -> Result<Self, Self::Error> {
        let meta = EntityMeta::restore(row.id, row.created_at, row.updated_at)
            .map_err(|err| RepoError::integrity(err.to_string()))?;
        Ok(Self {
            meta,
            author_id: row.author_id,
            post_id: row.post_id,
            comment: row.comment,
        })
    }
}

#[derive(FromRow)]
struct UpsertedRepostRow {
    #[sqlx(flatten)]
    repost: RepostRow,
    inserted: bool,
}

const REPOST_COLUMNS: &str = "id, author_id, post_id, comment, created_at, updated_at";

#[async_trait]
impl RepostsRepo for PostgresRepositories {
    async fn save_repost(&self, repost: &Repost) -> Result<Saved<Repost>, RepoError> {
        // The conditional DO UPDATE returns no row when the comment is unchanged.
        let upserted = sqlx::query_as::<_, UpsertedRepostRow>(
            r#"
            INSERT INTO reposts (id, author_id, post_id, comment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (author_id, post_id) DO UPDATE
                SET comment = EXCLUDED.comment, updated_at = EXCLUDED.updated_at
                WHERE reposts.comment IS DISTINCT FROM EXCLUDED.comment
            RETURNING id, author_id, post_id, comment, created_at, updated_at,
                (xmax = 0) AS inserted
            "#,
        )
        .bind(repost.meta.id)
        .bind(repost.author_id)
        .bind(repost.post_id)
        .bind(repost.comment.as_deref())
        .bind(repost.meta.created_at)
        .bind(repost.meta.updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if let Some(row) = upserted {
            let outcome = if row.inserted {
                SaveOutcome::Created
            } else {
                SaveOutcome::Updated
            };
            return Ok(Saved {
                record: Repost::try_from(row.repost)?,
                outcome,
            });
        }

        let sql =
            format!("SELECT {REPOST_COLUMNS} FROM reposts WHERE author_id = $1 AND post_id = $2");
        let existing = sqlx::query_as::<_, RepostRow>(&sql)
            .bind(repost.author_id)
            .bind(repost.post_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Saved {
            record: Repost::try_from(existing)?,
            outcome: SaveOutcome::Unchanged,
        })
    }

    async fn delete_repost(&self, author_id: Uuid, post_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM reposts WHERE author_id = $1 AND post_id = $2")
            .bind(author_id)
            .bind(post_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_reposts(&self, ids: &[Uuid]) -> Result<Vec<Repost>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {REPOST_COLUMNS} FROM reposts WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, RepostRow>(&sql)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Repost::try_from).collect()
    }

    async fn list_reposts_by_author(&self, author_id: Uuid) -> Result<Vec<Repost>, RepoError> {
        let sql = format!(
            "SELECT {REPOST_COLUMNS} FROM reposts WHERE author_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, RepostRow>(&sql)
            .bind(author_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Repost::try_from).collect()
    }
}

#[async_trait]
impl LikesRepo for PostgresRepositories {
    async fn save_like(&self, like: &Like) -> Result<SaveOutcome, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (id, user_id, post_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, post_id) DO NOTHING
            "#,
        )
        .bind(like.meta.id)
        .bind(like.user_id)
        .bind(like.post_id)
        .bind(like.meta.created_at)
        .bind(like.meta.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(insert_outcome(result.rows_affected()))
    }

    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FavoritesRepo for PostgresRepositories {
    async fn save_favorite(&self, favorite: &Favorite) -> Result<SaveOutcome, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO favorites (id, user_id, post_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, post_id) DO NOTHING
            "#,
        )
        .bind(favorite.meta.id)
        .bind(favorite.user_id)
        .bind(favorite.post_id)
        .bind(favorite.meta.created_at)
        .bind(favorite.meta.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(insert_outcome(result.rows_affected()))
    }

    async fn delete_favorite(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_favorites_by_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT post_id FROM favorites
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
