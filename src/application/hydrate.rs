//! Batch loaders that turn bare rows into views.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::application::repos::{PostsRepo, RepoError, UsersRepo};
use crate::domain::entities::Post;
use crate::domain::views::{AggregateCounts, AuthorSummary, PostSummary, PostView, ViewerFlags};

pub(crate) fn unique(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

pub(crate) async fn authors(
    users: &dyn UsersRepo,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, AuthorSummary>, RepoError> {
    let ids = unique(ids);
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let found = users.find_users(&ids).await?;
    Ok(found
        .iter()
        .map(|user| (user.id(), AuthorSummary::from(user)))
        .collect())
}

pub(crate) fn author_of(
    authors: &HashMap<Uuid, AuthorSummary>,
    id: Uuid,
) -> Result<AuthorSummary, RepoError> {
    authors
        .get(&id)
        .cloned()
        .ok_or_else(|| RepoError::integrity(format!("author `{id}` is missing")))
}

/// Attaches authors to posts, preserving input order.
pub(crate) async fn summarize(
    users: &dyn UsersRepo,
    posts: Vec<Post>,
) -> Result<Vec<PostSummary>, RepoError> {
    let authors = authors(users, posts.iter().map(|post| post.author_id)).await?;
    posts
        .into_iter()
        .map(|post| {
            let author = author_of(&authors, post.author_id)?;
            Ok(PostSummary { post, author })
        })
        .collect()
}

pub(crate) async fn counts(
    posts: &dyn PostsRepo,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, AggregateCounts>, RepoError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    posts.engagement_counts(ids).await
}

/// Flags for `viewer`; anonymous viewers get an empty map (all false).
pub(crate) async fn flags(
    posts: &dyn PostsRepo,
    viewer: Option<Uuid>,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, ViewerFlags>, RepoError> {
    match viewer {
        Some(viewer) if !ids.is_empty() => posts.viewer_flags(viewer, ids).await,
        _ => Ok(HashMap::new()),
    }
}

/// Fresh counts and viewer flags over post summaries.
pub(crate) async fn engage(
    posts: &dyn PostsRepo,
    viewer: Option<Uuid>,
    summaries: Vec<PostSummary>,
) -> Result<Vec<PostView>, RepoError> {
    let ids = unique(summaries.iter().map(|summary| summary.post.id()));
    let counts = counts(posts, &ids).await?;
    let flags = flags(posts, viewer, &ids).await?;
    Ok(summaries
        .into_iter()
        .map(|summary| {
            let id = summary.post.id();
            let counts = counts.get(&id).copied().unwrap_or_default();
            let flags = flags.get(&id).copied().unwrap_or_default();
            summary.with_engagement(counts, flags)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_keeps_first_occurrence_order() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(unique([b, a, b, a]), vec![b, a]);
    }
}
