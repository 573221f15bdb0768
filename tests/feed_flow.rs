//! End-to-end service flows over the in-memory repositories.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use agora::application::error::AppError;
use agora::application::pagination::PageWindow;
use agora::application::repos::{FollowsRepo, PostsRepo, RepostsRepo, SaveOutcome};
use agora::application::services::Services;
use agora::application::users::ProfileUpdate;
use agora::cache::{CacheBackend, CacheConfig, CacheError, CoherentCache};
use agora::domain::entities::{Post, Repost};
use agora::domain::error::DomainError;
use agora::domain::password::PasswordHash;
use agora::domain::views::{FeedActivity, FeedPage};
use agora::infra::memory::InMemoryRepositories;
use async_trait::async_trait;
use bytes::Bytes;
use time::{Duration, OffsetDateTime, macros::datetime};
use uuid::Uuid;

const T0: OffsetDateTime = datetime!(2024-06-01 09:00 UTC);

fn setup() -> (Arc<InMemoryRepositories>, Services) {
    setup_with_cache(CoherentCache::in_memory(CacheConfig::default()))
}

fn setup_with_cache(cache: CoherentCache) -> (Arc<InMemoryRepositories>, Services) {
    let repos = Arc::new(InMemoryRepositories::new());
    let services = Services::new(repos.clone(), cache);
    (repos, services)
}

async fn register(services: &Services, name: &str) -> Uuid {
    services
        .users
        .register(
            name,
            &format!("{name}@example.com"),
            PasswordHash::from_hash("argon2-hash"),
        )
        .await
        .expect("registration succeeds")
        .id()
}

async fn post_at(repos: &InMemoryRepositories, author: Uuid, content: &str, minutes: i64) -> Uuid {
    let post = Post::new(author, content, T0 + Duration::minutes(minutes)).expect("valid post");
    repos.insert_post(&post).await.expect("insert post");
    post.id()
}

async fn repost_at(repos: &InMemoryRepositories, author: Uuid, post: Uuid, minutes: i64) -> Uuid {
    let repost = Repost::new(author, post, None, T0 + Duration::minutes(minutes))
        .expect("valid repost");
    repos.save_repost(&repost).await.expect("save repost");
    repost.id()
}

fn post_ids(page: &FeedPage) -> Vec<Uuid> {
    page.items
        .iter()
        .map(|item| item.activity.post_id())
        .collect()
}

async fn feed(services: &Services, viewer: Uuid, limit: u32, offset: u32) -> FeedPage {
    services
        .feed
        .feed(viewer, PageWindow::new(Some(limit), Some(offset)))
        .await
        .expect("feed assembles")
}

#[tokio::test]
async fn followed_authors_appear_and_strangers_do_not() {
    let (_repos, services) = setup();
    let viewer = register(&services, "viewer").await;
    let alice = register(&services, "alice").await;
    let bob = register(&services, "bob").await;

    services.follows.follow(viewer, alice).await.unwrap();
    let p1 = services.posts.create_post(alice, "p1").await.unwrap().id();
    let p2 = services.posts.create_post(bob, "p2").await.unwrap().id();

    let page = feed(&services, viewer, 20, 0).await;
    assert_eq!(post_ids(&page), vec![p1]);
    assert_eq!(page.total, 1);

    services.follows.follow(viewer, bob).await.unwrap();
    let page = feed(&services, viewer, 20, 0).await;
    let ids = post_ids(&page);
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&p1) && ids.contains(&p2));
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn feed_is_newest_first_and_includes_own_posts() {
    let (repos, services) = setup();
    let viewer = register(&services, "viewer").await;
    let alice = register(&services, "alice").await;
    services.follows.follow(viewer, alice).await.unwrap();

    let oldest = post_at(&repos, alice, "first", 0).await;
    let own = post_at(&repos, viewer, "mine", 5).await;
    let newest = post_at(&repos, alice, "latest", 10).await;

    let page = feed(&services, viewer, 20, 0).await;
    assert_eq!(post_ids(&page), vec![newest, own, oldest]);
    assert!(
        page.items
            .windows(2)
            .all(|pair| pair[0].activity_time >= pair[1].activity_time)
    );
}

#[tokio::test]
async fn empty_follow_graph_still_shows_own_posts() {
    let (repos, services) = setup();
    let loner = register(&services, "loner").await;
    assert_eq!(feed(&services, loner, 20, 0).await.total, 0);

    // A different window is a different cache key, so the new post shows up.
    let post = post_at(&repos, loner, "hello?", 0).await;
    let page = services
        .feed
        .feed(loner, PageWindow::new(Some(5), None))
        .await
        .unwrap();
    assert_eq!(post_ids(&page), vec![post]);
}

#[tokio::test]
async fn pagination_windows_tile_the_full_feed() {
    let (repos, services) = setup();
    let viewer = register(&services, "viewer").await;
    let alice = register(&services, "alice").await;
    services.follows.follow(viewer, alice).await.unwrap();

    for minute in 0..7 {
        post_at(&repos, alice, "tick", minute).await;
    }
    let a_post = post_at(&repos, alice, "boosted", -30).await;
    repost_at(&repos, viewer, a_post, 3).await;

    let full = feed(&services, viewer, 100, 0).await;
    assert_eq!(full.total, 9);
    assert_eq!(full.items.len(), 9);

    let mut tiled = Vec::new();
    for offset in [0, 3, 6] {
        let page = feed(&services, viewer, 3, offset).await;
        assert_eq!(page.total, 9);
        tiled.extend(page.items);
    }
    assert_eq!(tiled, full.items);

    let past_end = feed(&services, viewer, 3, 9).await;
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, 9);
}

#[tokio::test]
async fn reposts_surface_at_repost_time() {
    let (repos, services) = setup();
    let viewer = register(&services, "viewer").await;
    let alice = register(&services, "alice").await;
    let bob = register(&services, "bob").await;
    services.follows.follow(viewer, bob).await.unwrap();

    let old = post_at(&repos, alice, "old news", 0).await;
    post_at(&repos, alice, "unseen", 5).await;
    let repost_id = repost_at(&repos, bob, old, 10).await;

    let page = feed(&services, viewer, 20, 0).await;
    assert_eq!(page.items.len(), 1);
    let item = &page.items[0];
    assert_eq!(item.activity_time, T0 + Duration::minutes(10));
    match &item.activity {
        FeedActivity::Repost {
            post,
            repost,
            repost_author,
        } => {
            assert_eq!(post.post.id(), old);
            assert_eq!(repost.id(), repost_id);
            assert_eq!(repost_author.id, bob);
        }
        other => panic!("expected a repost, got {other:?}"),
    }
    assert_eq!(item.counts.repost_count, 1);
}

#[tokio::test]
async fn new_post_extends_cached_author_list() {
    let (_repos, services) = setup();
    let alice = register(&services, "alice").await;
    let first = services.posts.create_post(alice, "first").await.unwrap().id();
    assert_eq!(services.posts.list_user_posts(alice, None).await.unwrap().len(), 1);

    let second = services.posts.create_post(alice, "hello").await.unwrap().id();
    let listed: Vec<Uuid> = services
        .posts
        .list_user_posts(alice, None)
        .await
        .unwrap()
        .iter()
        .map(|view| view.post.id())
        .collect();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&first) && listed.contains(&second));
}

#[tokio::test]
async fn like_invalidates_cached_post_counts() {
    let (_repos, services) = setup();
    let alice = register(&services, "alice").await;
    let fan = register(&services, "fan").await;
    let post = services.posts.create_post(alice, "hello").await.unwrap().id();

    let before = services.posts.get_post(post, Some(fan)).await.unwrap();
    assert_eq!(before.counts.like_count, 0);
    assert!(!before.flags.liked);

    assert_eq!(
        services.engagement.like(fan, post).await.unwrap(),
        SaveOutcome::Created
    );
    assert_eq!(
        services.engagement.like(fan, post).await.unwrap(),
        SaveOutcome::Unchanged
    );

    let after = services.posts.get_post(post, Some(fan)).await.unwrap();
    assert_eq!(after.counts.like_count, 1);
    assert!(after.flags.liked);

    let anonymous = services.posts.get_post(post, None).await.unwrap();
    assert_eq!(anonymous.counts.like_count, 1);
    assert!(!anonymous.flags.liked);

    assert!(services.engagement.unlike(fan, post).await.unwrap());
    assert!(!services.engagement.unlike(fan, post).await.unwrap());
    let undone = services.posts.get_post(post, Some(fan)).await.unwrap();
    assert_eq!(undone.counts.like_count, 0);
}

#[tokio::test]
async fn favorites_list_tracks_mutations() {
    let (_repos, services) = setup();
    let alice = register(&services, "alice").await;
    let fan = register(&services, "fan").await;
    let post = services.posts.create_post(alice, "keeper").await.unwrap().id();

    assert!(services.engagement.list_favorites(fan, Some(fan)).await.unwrap().is_empty());
    services.engagement.favorite(fan, post).await.unwrap();
    let favorites = services.engagement.list_favorites(fan, Some(fan)).await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert!(favorites[0].flags.favorited);
    assert_eq!(favorites[0].counts.favorite_count, 1);

    services.engagement.unfavorite(fan, post).await.unwrap();
    assert!(services.engagement.list_favorites(fan, Some(fan)).await.unwrap().is_empty());
}

#[tokio::test]
async fn repost_round_trip_refreshes_lists_feed_and_flags() {
    let (_repos, services) = setup();
    let author = register(&services, "author").await;
    let fan = register(&services, "fan").await;
    let post = services.posts.create_post(author, "worth sharing").await.unwrap().id();

    // warm every key the repost has to purge
    assert!(services.engagement.list_reposts(fan, Some(fan)).await.unwrap().is_empty());
    assert_eq!(feed(&services, fan, 20, 0).await.total, 0);
    let before = services.posts.get_post(post, Some(fan)).await.unwrap();
    assert!(!before.flags.reposted);
    assert_eq!(before.counts.repost_count, 0);

    let first = services
        .engagement
        .repost(fan, post, Some("nice"))
        .await
        .unwrap();
    let listed = services.engagement.list_reposts(fan, Some(fan)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].repost.comment.as_deref(), Some("nice"));
    assert!(listed[0].post.flags.reposted);

    let page = feed(&services, fan, 20, 0).await;
    assert_eq!(page.total, 1);
    assert_eq!(post_ids(&page), vec![post]);
    assert!(page.items[0].flags.reposted);
    assert_eq!(page.items[0].counts.repost_count, 1);

    let second = services
        .engagement
        .repost(fan, post, Some("still nice"))
        .await
        .unwrap();
    assert_eq!(second.id(), first.id());
    assert_eq!(second.comment.as_deref(), Some("still nice"));

    let listed = services.engagement.list_reposts(fan, Some(fan)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].repost.id(), first.id());
    assert_eq!(listed[0].repost.comment.as_deref(), Some("still nice"));
    let page = feed(&services, fan, 20, 0).await;
    assert_eq!(page.total, 1);
    match &page.items[0].activity {
        FeedActivity::Repost { repost, .. } => {
            assert_eq!(repost.comment.as_deref(), Some("still nice"));
        }
        other => panic!("expected repost activity, got {other:?}"),
    }

    let after = services.posts.get_post(post, Some(fan)).await.unwrap();
    assert!(after.flags.reposted);
    assert_eq!(after.counts.repost_count, 1);
    let anonymous = services.posts.get_post(post, None).await.unwrap();
    assert!(!anonymous.flags.reposted);

    assert!(services.engagement.unrepost(fan, post).await.unwrap());
    assert!(!services.engagement.unrepost(fan, post).await.unwrap());
    assert!(services.engagement.list_reposts(fan, Some(fan)).await.unwrap().is_empty());
    assert_eq!(feed(&services, fan, 20, 0).await.total, 0);
    let undone = services.posts.get_post(post, Some(fan)).await.unwrap();
    assert!(!undone.flags.reposted);
    assert_eq!(undone.counts.repost_count, 0);
}

#[tokio::test]
async fn repost_of_missing_post_is_not_found() {
    let (_repos, services) = setup();
    let fan = register(&services, "fan").await;
    let err = services
        .engagement
        .repost(fan, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn engagement_on_missing_post_is_not_found() {
    let (_repos, services) = setup();
    let fan = register(&services, "fan").await;
    let err = services.engagement.like(fan, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "post" }));
}

#[tokio::test]
async fn self_follow_is_rejected_without_touching_storage() {
    let (repos, services) = setup();
    let viewer = register(&services, "viewer").await;

    let err = services.follows.follow(viewer, viewer).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Domain(DomainError::Validation {
            field: "followee_id",
            ..
        })
    ));
    assert!(repos.list_followees(viewer).await.unwrap().is_empty());
    assert_eq!(services.users.get_user(viewer, None).await.unwrap().counts.following, 0);
}

#[tokio::test]
async fn follow_counts_refresh_after_follow_and_unfollow() {
    let (_repos, services) = setup();
    let viewer = register(&services, "viewer").await;
    let alice = register(&services, "alice").await;

    let profile = services.users.get_user(alice, Some(viewer)).await.unwrap();
    assert_eq!(profile.counts.followers, 0);
    assert!(!profile.followed);

    services.follows.follow(viewer, alice).await.unwrap();
    let profile = services.users.get_user(alice, Some(viewer)).await.unwrap();
    assert_eq!(profile.counts.followers, 1);
    assert!(profile.followed);

    assert!(services.follows.unfollow(viewer, alice).await.unwrap());
    let profile = services.users.get_user(alice, Some(viewer)).await.unwrap();
    assert_eq!(profile.counts.followers, 0);
    assert!(!profile.followed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_viewers_get_their_own_flags() {
    let (_repos, services) = setup();
    let alice = register(&services, "alice").await;
    let first = register(&services, "first").await;
    let second = register(&services, "second").await;
    services.follows.follow(first, alice).await.unwrap();
    services.follows.follow(second, alice).await.unwrap();
    let post = services.posts.create_post(alice, "shared").await.unwrap().id();
    services.engagement.like(first, post).await.unwrap();

    let (a, b) = tokio::join!(
        feed(&services, first, 20, 0),
        feed(&services, second, 20, 0)
    );
    assert_eq!(post_ids(&a), vec![post]);
    assert_eq!(post_ids(&b), vec![post]);
    assert!(a.items[0].flags.liked);
    assert!(!b.items[0].flags.liked);
    assert_eq!(a.items[0].counts, b.items[0].counts);
}

#[tokio::test]
async fn deleted_post_leaves_author_feed_and_lists() {
    let (_repos, services) = setup();
    let alice = register(&services, "alice").await;
    let mallory = register(&services, "mallory").await;
    let post = services.posts.create_post(alice, "regret").await.unwrap().id();
    assert_eq!(post_ids(&feed(&services, alice, 20, 0).await), vec![post]);
    assert_eq!(services.posts.list_user_posts(alice, None).await.unwrap().len(), 1);

    let err = services.posts.delete_post(mallory, post).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    services.posts.delete_post(alice, post).await.unwrap();
    let page = feed(&services, alice, 20, 0).await;
    assert!(page.items.is_empty());
    assert_eq!(page.total, 0);
    assert!(services.posts.list_user_posts(alice, None).await.unwrap().is_empty());
    assert!(matches!(
        services.posts.get_post(post, None).await.unwrap_err(),
        AppError::NotFound { .. }
    ));
}

#[tokio::test]
async fn edited_post_is_visible_on_next_read() {
    let (_repos, services) = setup();
    let alice = register(&services, "alice").await;
    let post = services.posts.create_post(alice, "draft").await.unwrap().id();
    assert_eq!(services.posts.get_post(post, None).await.unwrap().post.content, "draft");

    services.posts.update_post(alice, post, "final").await.unwrap();
    assert_eq!(services.posts.get_post(post, None).await.unwrap().post.content, "final");
}

#[tokio::test]
async fn rename_invalidates_name_lookups() {
    let (_repos, services) = setup();
    let user = register(&services, "ada").await;
    assert_eq!(services.users.get_user_by_name("ada").await.unwrap().id, user);

    services
        .users
        .update_profile(
            user,
            ProfileUpdate {
                username: Some("grace".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        services.users.get_user_by_name("ada").await.unwrap_err(),
        AppError::NotFound { entity: "user" }
    ));
    assert_eq!(services.users.get_user_by_name("grace").await.unwrap().id, user);
}

#[tokio::test]
async fn deleted_session_is_not_served_from_cache() {
    let (_repos, services) = setup();
    let user = register(&services, "ada").await;
    let expire_at = OffsetDateTime::now_utc() + Duration::hours(1);
    let session = services.sessions.create(user, expire_at).await.unwrap();

    assert_eq!(services.sessions.get(session.id()).await.unwrap(), session);
    assert!(services.sessions.delete(session.id()).await.unwrap());
    assert!(matches!(
        services.sessions.get(session.id()).await.unwrap_err(),
        AppError::NotFound { entity: "session" }
    ));
}

#[tokio::test]
async fn extended_session_is_reread_after_update() {
    let (_repos, services) = setup();
    let user = register(&services, "ada").await;
    let now = OffsetDateTime::now_utc();
    let session = services
        .sessions
        .create(user, now + Duration::hours(1))
        .await
        .unwrap();
    services.sessions.get(session.id()).await.unwrap();

    let extended = services
        .sessions
        .update_expiry(session.id(), now + Duration::days(7))
        .await
        .unwrap();
    let fetched = services.sessions.get(session.id()).await.unwrap();
    assert_eq!(fetched.expire_at, extended.expire_at);
}

struct UnreachableBackend;

#[async_trait]
impl CacheBackend for UnreachableBackend {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: StdDuration) -> Result<(), CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn delete_by_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[tokio::test]
async fn cache_outage_degrades_to_repository_reads() {
    let cache = CoherentCache::new(Arc::new(UnreachableBackend), CacheConfig::default());
    let (_repos, services) = setup_with_cache(cache);
    let viewer = register(&services, "viewer").await;
    let alice = register(&services, "alice").await;
    services.follows.follow(viewer, alice).await.unwrap();

    let post = services.posts.create_post(alice, "still here").await.unwrap().id();
    services.engagement.like(viewer, post).await.unwrap();

    let page = feed(&services, viewer, 20, 0).await;
    assert_eq!(post_ids(&page), vec![post]);
    assert_eq!(page.items[0].counts.like_count, 1);
    assert!(page.items[0].flags.liked);
    assert_eq!(services.posts.get_post(post, None).await.unwrap().counts.like_count, 1);
}

#[tokio::test]
async fn disabled_cache_reads_through_every_time() {
    let config = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    let (repos, services) = setup_with_cache(CoherentCache::in_memory(config));
    let alice = register(&services, "alice").await;
    post_at(&repos, alice, "one", 0).await;
    assert_eq!(feed(&services, alice, 20, 0).await.total, 1);

    post_at(&repos, alice, "two", 1).await;
    assert_eq!(feed(&services, alice, 20, 0).await.total, 2);
}

#[tokio::test]
async fn oversized_ttls_still_serve_and_cache_the_feed() {
    let config = CacheConfig {
        default_ttl_secs: u64::MAX,
        feed_ttl_secs: u64::MAX,
        ..CacheConfig::default()
    };
    let (repos, services) = setup_with_cache(CoherentCache::in_memory(config));
    let alice = register(&services, "alice").await;
    let post = services.posts.create_post(alice, "long lived").await.unwrap().id();

    let page = feed(&services, alice, 20, 0).await;
    assert_eq!(post_ids(&page), vec![post]);
    assert_eq!(page.total, 1);

    // a direct repository write bypasses invalidation, so the cached window still answers
    post_at(&repos, alice, "unseen", 60).await;
    assert_eq!(feed(&services, alice, 20, 0).await.total, 1);
}

#[tokio::test]
async fn deleted_post_ages_out_of_other_users_lists() {
    let config = CacheConfig {
        default_ttl_secs: 1,
        feed_ttl_secs: 1,
        ..CacheConfig::default()
    };
    let (_repos, services) = setup_with_cache(CoherentCache::in_memory(config));
    let author = register(&services, "author").await;
    let fan = register(&services, "fan").await;
    let post = services.posts.create_post(author, "short lived").await.unwrap().id();
    services.engagement.favorite(fan, post).await.unwrap();
    services.engagement.repost(fan, post, None).await.unwrap();
    assert_eq!(services.engagement.list_favorites(fan, Some(fan)).await.unwrap().len(), 1);
    assert_eq!(services.engagement.list_reposts(fan, Some(fan)).await.unwrap().len(), 1);

    services.posts.delete_post(author, post).await.unwrap();

    // engagement is rehydrated even while the list entry is cached
    for view in services.engagement.list_favorites(fan, Some(fan)).await.unwrap() {
        assert_eq!(view.counts.favorite_count, 0);
        assert!(!view.flags.favorited);
    }

    tokio::time::sleep(StdDuration::from_millis(1_100)).await;
    assert!(services.engagement.list_favorites(fan, Some(fan)).await.unwrap().is_empty());
    assert!(services.engagement.list_reposts(fan, Some(fan)).await.unwrap().is_empty());
    assert_eq!(feed(&services, fan, 20, 0).await.total, 0);
}
