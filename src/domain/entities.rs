//! Persisted entities and their construction-time invariants.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{error::DomainError, password::PasswordHash};

pub const MAX_POST_CONTENT_CHARS: usize = 5000;
pub const MAX_REPOST_COMMENT_CHARS: usize = 1000;

/// Identity and timestamps shared by every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl EntityMeta {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds metadata read back from storage.
    pub fn restore(
        id: Uuid,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        let meta = Self {
            id,
            created_at,
            updated_at,
        };
        validate_meta(&meta)?;
        Ok(meta)
    }

    pub fn touch(&mut self, now: OffsetDateTime) -> Result<(), DomainError> {
        self.updated_at = now;
        validate_meta(self)
    }
}

pub fn validate_meta(meta: &EntityMeta) -> Result<(), DomainError> {
    if meta.id.is_nil() {
        return Err(DomainError::validation("id", "must not be nil"));
    }
    if meta.created_at > meta.updated_at {
        return Err(DomainError::validation(
            "created_at",
            "must not be later than updated_at",
        ));
    }
    Ok(())
}

fn require_id(field: &'static str, id: Uuid) -> Result<(), DomainError> {
    if id.is_nil() {
        return Err(DomainError::validation(field, "must not be nil"));
    }
    Ok(())
}

fn normalize_post_content(content: &str) -> Result<String, DomainError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("content", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_POST_CONTENT_CHARS {
        return Err(DomainError::validation(
            "content",
            format!("must be at most {MAX_POST_CONTENT_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_comment(comment: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(trimmed) = comment.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > MAX_REPOST_COMMENT_CHARS {
        return Err(DomainError::validation(
            "comment",
            format!("must be at most {MAX_REPOST_COMMENT_CHARS} characters"),
        ));
    }
    Ok(Some(trimmed.to_string()))
}

fn normalize_username(username: &str) -> Result<String, DomainError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("username", "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn normalize_email(email: &str) -> Result<String, DomainError> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(DomainError::validation("email", "must not be empty"));
    }
    if !normalized.contains('@') {
        return Err(DomainError::validation("email", "must contain `@`"));
    }
    Ok(normalized)
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub meta: EntityMeta,
    pub username: String,
    pub email: String,
    pub password: PasswordHash,
}

impl User {
    pub fn new(
        username: &str,
        email: &str,
        password: PasswordHash,
        now: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            meta: EntityMeta::new(now),
            username: normalize_username(username)?,
            email: normalize_email(email)?,
            password,
        })
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    pub fn rename(&mut self, username: &str, now: OffsetDateTime) -> Result<(), DomainError> {
        self.username = normalize_username(username)?;
        self.meta.touch(now)
    }

    pub fn change_email(&mut self, email: &str, now: OffsetDateTime) -> Result<(), DomainError> {
        self.email = normalize_email(email)?;
        self.meta.touch(now)
    }

    pub fn change_password(
        &mut self,
        password: PasswordHash,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        self.password = password;
        self.meta.touch(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub meta: EntityMeta,
    pub author_id: Uuid,
    pub content: String,
}

impl Post {
    pub fn new(author_id: Uuid, content: &str, now: OffsetDateTime) -> Result<Self, DomainError> {
        require_id("author_id", author_id)?;
        Ok(Self {
            meta: EntityMeta::new(now),
            author_id,
            content: normalize_post_content(content)?,
        })
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    pub fn edit(&mut self, content: &str, now: OffsetDateTime) -> Result<(), DomainError> {
        self.content = normalize_post_content(content)?;
        self.meta.touch(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repost {
    pub meta: EntityMeta,
    pub author_id: Uuid,
    pub post_id: Uuid,
    pub comment: Option<String>,
}

impl Repost {
    pub fn new(
        author_id: Uuid,
        post_id: Uuid,
        comment: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        require_id("author_id", author_id)?;
        require_id("post_id", post_id)?;
        Ok(Self {
            meta: EntityMeta::new(now),
            author_id,
            post_id,
            comment: normalize_comment(comment)?,
        })
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    pub fn update_comment(
        &mut self,
        comment: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        self.comment = normalize_comment(comment)?;
        self.meta.touch(now)
    }
}

/// A (user, post) pair shared by likes and favorites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engagement {
    pub meta: EntityMeta,
    pub user_id: Uuid,
    pub post_id: Uuid,
}

impl Engagement {
    pub fn new(user_id: Uuid, post_id: Uuid, now: OffsetDateTime) -> Result<Self, DomainError> {
        require_id("user_id", user_id)?;
        require_id("post_id", post_id)?;
        Ok(Self {
            meta: EntityMeta::new(now),
            user_id,
            post_id,
        })
    }
}

pub type Like = Engagement;
pub type Favorite = Engagement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Follow {
    pub meta: EntityMeta,
    pub follower_id: Uuid,
    pub followee_id: Uuid,
}

impl Follow {
    pub fn new(
        follower_id: Uuid,
        followee_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        require_id("follower_id", follower_id)?;
        require_id("followee_id", followee_id)?;
        if follower_id == followee_id {
            return Err(DomainError::validation(
                "followee_id",
                "users cannot follow themselves",
            ));
        }
        Ok(Self {
            meta: EntityMeta::new(now),
            follower_id,
            followee_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub meta: EntityMeta,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expire_at: OffsetDateTime,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        expire_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        require_id("user_id", user_id)?;
        if expire_at < now {
            return Err(DomainError::validation(
                "expire_at",
                "must not be in the past",
            ));
        }
        Ok(Self {
            meta: EntityMeta::new(now),
            user_id,
            expire_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.meta.id
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expire_at
    }

    pub fn extend(
        &mut self,
        expire_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        if expire_at < now {
            return Err(DomainError::validation(
                "expire_at",
                "must not be in the past",
            ));
        }
        self.expire_at = expire_at;
        self.meta.touch(now)
    }
}
