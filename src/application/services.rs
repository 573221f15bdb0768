use std::sync::Arc;

use crate::application::engagement::EngagementService;
use crate::application::feed::{FeedAssembler, FeedService};
use crate::application::follows::FollowService;
use crate::application::posts::PostService;
use crate::application::repos::{
    FavoritesRepo, FeedRepo, FollowsRepo, LikesRepo, PostsRepo, RepostsRepo, SessionsRepo,
    UsersRepo,
};
use crate::application::sessions::SessionService;
use crate::application::users::UserService;
use crate::cache::{CoherentCache, InvalidationRouter};

/// An adapter implementing every repository trait.
pub trait Repositories:
    UsersRepo
    + PostsRepo
    + RepostsRepo
    + LikesRepo
    + FavoritesRepo
    + FollowsRepo
    + FeedRepo
    + SessionsRepo
    + 'static
{
}

impl<T> Repositories for T where
    T: UsersRepo
        + PostsRepo
        + RepostsRepo
        + LikesRepo
        + FavoritesRepo
        + FollowsRepo
        + FeedRepo
        + SessionsRepo
        + 'static
{
}

/// Every service, sharing one cache and one invalidation router.
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub posts: PostService,
    pub engagement: EngagementService,
    pub follows: FollowService,
    pub sessions: SessionService,
    pub feed: FeedService,
    pub cache: CoherentCache,
}

impl Services {
    pub fn new<R: Repositories>(repos: Arc<R>, cache: CoherentCache) -> Self {
        let router = InvalidationRouter::new(cache.clone());
        let users: Arc<dyn UsersRepo> = repos.clone();
        let posts: Arc<dyn PostsRepo> = repos.clone();
        let reposts: Arc<dyn RepostsRepo> = repos.clone();
        let likes: Arc<dyn LikesRepo> = repos.clone();
        let favorites: Arc<dyn FavoritesRepo> = repos.clone();
        let follows: Arc<dyn FollowsRepo> = repos.clone();
        let feed: Arc<dyn FeedRepo> = repos.clone();
        let sessions: Arc<dyn SessionsRepo> = repos;

        let assembler = FeedAssembler::new(
            follows.clone(),
            feed,
            posts.clone(),
            reposts.clone(),
            users.clone(),
        );

        Self {
            users: UserService::new(users.clone(), cache.clone(), router.clone()),
            posts: PostService::new(posts.clone(), users.clone(), cache.clone(), router.clone()),
            engagement: EngagementService::new(
                posts.clone(),
                users.clone(),
                likes,
                favorites,
                reposts,
                cache.clone(),
                router.clone(),
            ),
            follows: FollowService::new(follows, users.clone(), router.clone()),
            sessions: SessionService::new(sessions, users, cache.clone(), router),
            feed: FeedService::new(assembler, posts, cache.clone()),
            cache,
        }
    }
}
