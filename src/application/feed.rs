//! Activity feed: posts and reposts by the viewer and everyone they follow,
//! newest first.

use std::{cmp::Ordering, collections::HashMap, sync::Arc, time::Instant};

use metrics::histogram;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::hydrate;
use crate::application::pagination::PageWindow;
use crate::application::repos::{FeedRepo, FollowsRepo, PostsRepo, RepostsRepo, UsersRepo};
use crate::cache::{CacheKey, CoherentCache};
use crate::domain::views::{
    FeedActivity, FeedEntry, FeedEntryKind, FeedItemSnapshot, FeedPage, FeedSnapshot, PostSummary,
    feed_order,
};

const METRIC_FEED_ASSEMBLE_MS: &str = "agora_feed_assemble_ms";

/// Merges two listings already sorted by [`feed_order`], keeping at most
/// `bound` entries.
pub fn merge_sorted(left: Vec<FeedEntry>, right: Vec<FeedEntry>, bound: usize) -> Vec<FeedEntry> {
    let mut merged = Vec::with_capacity(bound.min(left.len() + right.len()));
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    while merged.len() < bound {
        let next = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => {
                if feed_order(a, b) != Ordering::Greater {
                    left.next()
                } else {
                    right.next()
                }
            }
            (Some(_), None) => left.next(),
            (None, Some(_)) => right.next(),
            (None, None) => None,
        };
        match next {
            Some(entry) => merged.push(entry),
            None => break,
        }
    }
    merged
}

/// Builds viewer-independent feed windows straight from the repositories.
#[derive(Clone)]
pub struct FeedAssembler {
    follows: Arc<dyn FollowsRepo>,
    feed: Arc<dyn FeedRepo>,
    posts: Arc<dyn PostsRepo>,
    reposts: Arc<dyn RepostsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FeedAssembler {
    pub fn new(
        follows: Arc<dyn FollowsRepo>,
        feed: Arc<dyn FeedRepo>,
        posts: Arc<dyn PostsRepo>,
        reposts: Arc<dyn RepostsRepo>,
        users: Arc<dyn UsersRepo>,
    ) -> Self {
        Self {
            follows,
            feed,
            posts,
            reposts,
            users,
        }
    }

    /// The viewer followed by everyone they follow.
    pub async fn visibility_set(&self, viewer_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let followees = self.follows.list_followees(viewer_id).await?;
        Ok(hydrate::unique(std::iter::once(viewer_id).chain(followees)))
    }

    /// Assembles one window, with fresh flags for the viewer.
    pub async fn assemble(
        &self,
        viewer_id: Uuid,
        window: PageWindow,
    ) -> Result<FeedPage, AppError> {
        let snapshot = self.assemble_snapshot(viewer_id, window).await?;
        overlay_flags(self.posts.as_ref(), viewer_id, snapshot).await
    }

    /// Assembles one window without viewer-relative fields.
    #[instrument(skip(self), fields(limit = window.limit(), offset = window.offset()))]
    pub async fn assemble_snapshot(
        &self,
        viewer_id: Uuid,
        window: PageWindow,
    ) -> Result<FeedSnapshot, AppError> {
        let started = Instant::now();
        let authors = self.visibility_set(viewer_id).await?;
        let bound = window.bound();

        let (posts, reposts, total) = futures::try_join!(
            self.feed.list_post_entries(&authors, bound),
            self.feed.list_repost_entries(&authors, bound),
            self.feed.count_feed_entries(&authors),
        )?;

        let page: Vec<FeedEntry> = merge_sorted(posts, reposts, bound as usize)
            .into_iter()
            .skip(window.offset() as usize)
            .take(window.limit() as usize)
            .collect();
        let items = self.hydrate(page).await?;

        histogram!(METRIC_FEED_ASSEMBLE_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(
            viewer_id = %viewer_id,
            authors = authors.len(),
            items = items.len(),
            total,
            "feed window assembled"
        );
        Ok(FeedSnapshot { items, total })
    }

    async fn hydrate(&self, page: Vec<FeedEntry>) -> Result<Vec<FeedItemSnapshot>, AppError> {
        if page.is_empty() {
            return Ok(Vec::new());
        }

        let repost_ids: Vec<Uuid> = page
            .iter()
            .filter(|entry| entry.kind == FeedEntryKind::Repost)
            .map(|entry| entry.id)
            .collect();
        let post_ids = hydrate::unique(page.iter().map(|entry| entry.post_id));

        let (posts, reposts, counts) = futures::try_join!(
            self.posts.find_posts(&post_ids),
            self.reposts.find_reposts(&repost_ids),
            hydrate::counts(self.posts.as_ref(), &post_ids),
        )?;

        let posts: HashMap<Uuid, PostSummary> = hydrate::summarize(self.users.as_ref(), posts)
            .await?
            .into_iter()
            .map(|summary| (summary.post.id(), summary))
            .collect();
        let reposts: HashMap<Uuid, _> = reposts
            .into_iter()
            .map(|repost| (repost.id(), repost))
            .collect();
        let repost_authors =
            hydrate::authors(self.users.as_ref(), reposts.values().map(|r| r.author_id)).await?;

        let mut items = Vec::with_capacity(page.len());
        for entry in page {
            let Some(post) = posts.get(&entry.post_id).cloned() else {
                debug!(post_id = %entry.post_id, "feed entry dropped: post vanished");
                continue;
            };
            let activity = match entry.kind {
                FeedEntryKind::Original => FeedActivity::Original { post },
                FeedEntryKind::Repost => {
                    let Some(repost) = reposts.get(&entry.id).cloned() else {
                        debug!(repost_id = %entry.id, "feed entry dropped: repost vanished");
                        continue;
                    };
                    let repost_author = hydrate::author_of(&repost_authors, repost.author_id)?;
                    FeedActivity::Repost {
                        post,
                        repost,
                        repost_author,
                    }
                }
            };
            items.push(FeedItemSnapshot {
                activity,
                counts: counts.get(&entry.post_id).copied().unwrap_or_default(),
                activity_time: entry.activity_time,
            });
        }
        Ok(items)
    }
}

async fn overlay_flags(
    posts: &dyn PostsRepo,
    viewer_id: Uuid,
    snapshot: FeedSnapshot,
) -> Result<FeedPage, AppError> {
    let ids = hydrate::unique(snapshot.items.iter().map(|item| item.activity.post_id()));
    let flags = hydrate::flags(posts, Some(viewer_id), &ids).await?;
    let items = snapshot
        .items
        .into_iter()
        .map(|item| {
            let flags = flags
                .get(&item.activity.post_id())
                .copied()
                .unwrap_or_default();
            item.with_flags(flags)
        })
        .collect();
    Ok(FeedPage {
        items,
        total: snapshot.total,
    })
}

/// Cached feed reads. Windows are cached without flags; flags are computed
/// per request.
#[derive(Clone)]
pub struct FeedService {
    assembler: FeedAssembler,
    posts: Arc<dyn PostsRepo>,
    cache: CoherentCache,
}

impl FeedService {
    pub fn new(assembler: FeedAssembler, posts: Arc<dyn PostsRepo>, cache: CoherentCache) -> Self {
        Self {
            assembler,
            posts,
            cache,
        }
    }

    #[instrument(skip(self), fields(limit = window.limit(), offset = window.offset()))]
    pub async fn feed(&self, viewer_id: Uuid, window: PageWindow) -> Result<FeedPage, AppError> {
        let key = CacheKey::FeedPage {
            user_id: viewer_id,
            limit: window.limit(),
            offset: window.offset(),
        };
        let snapshot = self
            .cache
            .read_through(&key, || self.assembler.assemble_snapshot(viewer_id, window))
            .await?;
        overlay_flags(self.posts.as_ref(), viewer_id, snapshot).await
    }
}
