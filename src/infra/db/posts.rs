use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{PostsRepo, RepoError};
use crate::domain::entities::{EntityMeta, Post};
use crate::domain::views::{AggregateCounts, ViewerFlags};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    content: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<PostRow> for Post {
    type Error = RepoError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let meta = EntityMeta::restore(row.id, row.created_at, row.updated_at)
            .map_err(|err| RepoError::integrity(err.to_string()))?;
        Ok(Self {
            meta,
            author_id: row.author_id,
            content: row.content,
        })
    }
}

#[derive(FromRow)]
struct CountsRow {
    id: Uuid,
    like_count: i64,
    favorite_count: i64,
    repost_count: i64,
}

#[derive(FromRow)]
struct FlagsRow {
    id: Uuid,
    liked: bool,
    favorited: bool,
    reposted: bool,
}

const POST_COLUMNS: &str = "id, author_id, content, created_at, updated_at";

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn insert_post(&self, post: &Post) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, author_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(post.meta.id)
        .bind(post.author_id)
        .bind(&post.content)
        .bind(post.meta.created_at)
        .bind(post.meta.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_post(&self, post: &Post) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE posts SET content = $2, updated_at = $3 WHERE id = $1")
            .bind(post.meta.id)
            .bind(&post.content)
            .bind(post.meta.updated_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, RepoError> {
        // likes, favorites and reposts go with the post through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(Post::try_from).transpose()
    }

    async fn find_posts(&self, ids: &[Uuid]) -> Result<Vec<Post>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Post::try_from).collect()
    }

    async fn list_posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE author_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(author_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Post::try_from).collect()
    }

    async fn engagement_counts(
        &self,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AggregateCounts>, RepoError> {
        let mut counts: HashMap<Uuid, AggregateCounts> = post_ids
            .iter()
            .map(|id| (*id, AggregateCounts::default()))
            .collect();
        if post_ids.is_empty() {
            return Ok(counts);
        }

        let rows = sqlx::query_as::<_, CountsRow>(
            r#"
            SELECT
                p.id,
                (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
                (SELECT COUNT(*) FROM favorites f WHERE f.post_id = p.id) AS favorite_count,
                (SELECT COUNT(*) FROM reposts r WHERE r.post_id = p.id) AS repost_count
            FROM posts p
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(post_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        for row in rows {
            counts.insert(
                row.id,
                AggregateCounts {
                    like_count: Self::convert_count(row.like_count)?,
                    favorite_count: Self::convert_count(row.favorite_count)?,
                    repost_count: Self::convert_count(row.repost_count)?,
                },
            );
        }
        Ok(counts)
    }

    async fn viewer_flags(
        &self,
        viewer_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ViewerFlags>, RepoError> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, FlagsRow>(
            r#"
            SELECT
                p.id,
                EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = $2)
                    AS liked,
                EXISTS (SELECT 1 FROM favorites f WHERE f.post_id = p.id AND f.user_id = $2)
                    AS favorited,
                EXISTS (SELECT 1 FROM reposts r WHERE r.post_id = p.id AND r.author_id = $2)
                    AS reposted
            FROM posts p
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(post_ids)
        .bind(viewer_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.id,
                    ViewerFlags {
                        liked: row.liked,
                        favorited: row.favorited,
                        reposted: row.reposted,
                    },
                )
            })
            .collect())
    }
}
