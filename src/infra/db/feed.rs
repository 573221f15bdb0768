use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{FeedRepo, RepoError};
use crate::domain::views::{FeedEntry, FeedEntryKind};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(FromRow)]
struct FeedEntryRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    created_at: OffsetDateTime,
}

impl FeedEntryRow {
    fn into_entry(self, kind: FeedEntryKind) -> FeedEntry {
        FeedEntry {
            kind,
            id: self.id,
            post_id: self.post_id,
            author_id: self.author_id,
            activity_time: self.created_at,
        }
    }
}

// Each source is filtered by author membership alone; joining reposts onto
// posts would emit a followed post once per repost.
#[async_trait]
impl FeedRepo for PostgresRepositories {
    async fn list_post_entries(
        &self,
        author_ids: &[Uuid],
        bound: u64,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        if author_ids.is_empty() || bound == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, FeedEntryRow>(
            r#"
            SELECT id, id AS post_id, author_id, created_at
            FROM posts
            WHERE author_id = ANY($1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(author_ids)
        .bind(Self::convert_bound(bound))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_entry(FeedEntryKind::Original))
            .collect())
    }

    async fn list_repost_entries(
        &self,
        author_ids: &[Uuid],
        bound: u64,
    ) -> Result<Vec<FeedEntry>, RepoError> {
        if author_ids.is_empty() || bound == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, FeedEntryRow>(
            r#"
            SELECT id, post_id, author_id, created_at
            FROM reposts
            WHERE author_id = ANY($1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(author_ids)
        .bind(Self::convert_bound(bound))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_entry(FeedEntryKind::Repost))
            .collect())
    }

    async fn count_feed_entries(&self, author_ids: &[Uuid]) -> Result<u64, RepoError> {
        if author_ids.is_empty() {
            return Ok(0);
        }
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM posts WHERE author_id = ANY($1))
                + (SELECT COUNT(*) FROM reposts WHERE author_id = ANY($1))
            "#,
        )
        .bind(author_ids)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Self::convert_count(total)
    }
}
