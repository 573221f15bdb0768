//! Repository behaviour against a real Postgres instance.
//!
//! Run with `DATABASE_URL` set and `cargo test -- --ignored`.

use std::sync::Arc;

use agora::application::pagination::PageWindow;
use agora::application::repos::{
    FeedRepo, FollowsRepo, LikesRepo, PostsRepo, RepoError, RepostsRepo, SaveOutcome,
    SessionsRepo, UsersRepo,
};
use agora::application::services::Services;
use agora::cache::{CacheConfig, CoherentCache};
use agora::domain::entities::{Follow, Like, Post, Repost, Session, User};
use agora::domain::password::PasswordHash;
use agora::domain::views::FeedEntryKind;
use agora::infra::db::PostgresRepositories;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime, macros::datetime};
use uuid::Uuid;

const T0: OffsetDateTime = datetime!(2024-07-01 08:00 UTC);

async fn user(repos: &PostgresRepositories, name: &str) -> Uuid {
    let user = User::new(
        name,
        &format!("{name}@example.com"),
        PasswordHash::from_hash("hash"),
        T0,
    )
    .expect("valid user");
    repos.insert_user(&user).await.expect("insert user");
    user.id()
}

async fn post(repos: &PostgresRepositories, author: Uuid, minutes: i64) -> Uuid {
    let post = Post::new(author, "body", T0 + Duration::minutes(minutes)).expect("valid post");
    repos.insert_post(&post).await.expect("insert post");
    post.id()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_username_maps_to_duplicate_error(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    user(&repos, "ada").await;
    let clash = User::new("ada", "x@example.com", PasswordHash::from_hash("h"), T0).unwrap();
    let err = repos.insert_user(&clash).await.unwrap_err();
    assert!(matches!(err, RepoError::Duplicate { .. }));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn engagement_upserts_are_idempotent(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "ada").await;
    let fan = user(&repos, "bob").await;
    let post_id = post(&repos, author, 0).await;

    let like = Like::new(fan, post_id, T0).unwrap();
    assert_eq!(repos.save_like(&like).await.unwrap(), SaveOutcome::Created);
    let again = Like::new(fan, post_id, T0).unwrap();
    assert_eq!(repos.save_like(&again).await.unwrap(), SaveOutcome::Unchanged);

    let first = repos
        .save_repost(&Repost::new(fan, post_id, Some("hi"), T0).unwrap())
        .await
        .unwrap();
    assert_eq!(first.outcome, SaveOutcome::Created);
    let same = repos
        .save_repost(&Repost::new(fan, post_id, Some("hi"), T0).unwrap())
        .await
        .unwrap();
    assert_eq!(same.outcome, SaveOutcome::Unchanged);
    let edited = repos
        .save_repost(&Repost::new(fan, post_id, Some("hello"), T0).unwrap())
        .await
        .unwrap();
    assert_eq!(edited.outcome, SaveOutcome::Updated);
    assert_eq!(edited.record.id(), first.record.id());

    let counts = repos.engagement_counts(&[post_id]).await.unwrap();
    assert_eq!(counts[&post_id].like_count, 1);
    assert_eq!(counts[&post_id].repost_count, 1);

    let flags = repos.viewer_flags(fan, &[post_id]).await.unwrap();
    assert!(flags[&post_id].liked && flags[&post_id].reposted);
    assert!(!flags[&post_id].favorited);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn feed_sources_do_not_duplicate_reposted_posts(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let alice = user(&repos, "alice").await;
    let bob = user(&repos, "bob").await;
    let carol = user(&repos, "carol").await;
    let post_id = post(&repos, alice, 0).await;
    for (fan, minutes) in [(bob, 1), (carol, 2)] {
        repos
            .save_repost(&Repost::new(fan, post_id, None, T0 + Duration::minutes(minutes)).unwrap())
            .await
            .unwrap();
    }

    let authors = [alice];
    let posts = repos.list_post_entries(&authors, 10).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].kind, FeedEntryKind::Original);
    assert!(repos.list_repost_entries(&authors, 10).await.unwrap().is_empty());
    assert_eq!(repos.count_feed_entries(&authors).await.unwrap(), 1);

    let everyone = [alice, bob, carol];
    assert_eq!(repos.count_feed_entries(&everyone).await.unwrap(), 3);
    let reposts = repos.list_repost_entries(&everyone, 1).await.unwrap();
    assert_eq!(reposts.len(), 1);
    assert_eq!(reposts[0].author_id, carol);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleting_a_post_cascades(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let author = user(&repos, "ada").await;
    let fan = user(&repos, "bob").await;
    let post_id = post(&repos, author, 0).await;
    repos
        .save_like(&Like::new(fan, post_id, T0).unwrap())
        .await
        .unwrap();
    repos
        .save_repost(&Repost::new(fan, post_id, None, T0).unwrap())
        .await
        .unwrap();

    assert!(repos.delete_post(post_id).await.unwrap());
    assert!(!repos.delete_post(post_id).await.unwrap());
    assert!(repos.list_reposts_by_author(fan).await.unwrap().is_empty());
    assert!(!repos.delete_like(fan, post_id).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn follows_and_sessions_round_trip(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let ada = user(&repos, "ada").await;
    let bob = user(&repos, "bob").await;

    let follow = Follow::new(ada, bob, T0).unwrap();
    assert_eq!(repos.save_follow(&follow).await.unwrap(), SaveOutcome::Created);
    assert_eq!(repos.save_follow(&follow).await.unwrap(), SaveOutcome::Unchanged);
    assert_eq!(repos.list_followees(ada).await.unwrap(), vec![bob]);
    assert!(repos.is_following(ada, bob).await.unwrap());
    assert_eq!(repos.follow_counts(bob).await.unwrap().followers, 1);

    let mut session = Session::new(ada, T0 + Duration::hours(1), T0).unwrap();
    repos.insert_session(&session).await.unwrap();
    session
        .extend(T0 + Duration::days(1), T0 + Duration::minutes(5))
        .unwrap();
    assert!(repos.update_session_expiry(&session).await.unwrap());
    let stored = repos.find_session(session.id()).await.unwrap().unwrap();
    assert_eq!(stored.expire_at, T0 + Duration::days(1));
    assert!(repos.delete_session(session.id()).await.unwrap());
    assert!(repos.find_session(session.id()).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn services_assemble_feed_over_postgres(pool: PgPool) {
    let repos = Arc::new(PostgresRepositories::new(pool));
    let services = Services::new(
        repos.clone(),
        CoherentCache::in_memory(CacheConfig::default()),
    );
    let viewer = user(&repos, "viewer").await;
    let alice = user(&repos, "alice").await;
    services.follows.follow(viewer, alice).await.unwrap();
    let older = post(&repos, alice, 0).await;
    let newer = post(&repos, alice, 1).await;

    let page = services
        .feed
        .feed(viewer, PageWindow::default())
        .await
        .unwrap();
    let ids: Vec<Uuid> = page.items.iter().map(|i| i.activity.post_id()).collect();
    assert_eq!(ids, vec![newer, older]);
    assert_eq!(page.total, 2);
}
