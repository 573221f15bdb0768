//! Write-path cache invalidation.
//!
//! Every mutation maps to an ordered list of deletions via a pure planning
//! step ([`InvalidationPlan::for_mutation`]). The [`InvalidationRouter`]
//! executes the plan after the repository write has committed. Failures are
//! logged and counted; they never undo or fail the write.

use std::fmt;

use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use super::coherent::CoherentCache;
use super::keys::{CacheKey, KeyPattern};

pub(crate) const METRIC_INVALIDATED_KEYS: &str = "agora_cache_invalidated_keys_total";
pub(crate) const METRIC_INVALIDATION_FAILURES: &str = "agora_cache_invalidation_failures_total";

/// A committed write that may have made cached views stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PostCreated {
        author_id: Uuid,
    },
    PostUpdated {
        post_id: Uuid,
        author_id: Uuid,
    },
    PostDeleted {
        post_id: Uuid,
        author_id: Uuid,
    },
    Liked {
        post_id: Uuid,
    },
    Unliked {
        post_id: Uuid,
    },
    Favorited {
        post_id: Uuid,
        user_id: Uuid,
    },
    Unfavorited {
        post_id: Uuid,
        user_id: Uuid,
    },
    Reposted {
        post_id: Uuid,
        user_id: Uuid,
    },
    Unreposted {
        post_id: Uuid,
        user_id: Uuid,
    },
    Followed {
        follower_id: Uuid,
        followee_id: Uuid,
    },
    Unfollowed {
        follower_id: Uuid,
        followee_id: Uuid,
    },
    SessionDeleted {
        session_id: Uuid,
    },
    SessionExpiryUpdated {
        session_id: Uuid,
    },
    UserUpdated {
        user_id: Uuid,
        old_username: String,
        new_username: String,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PostCreated { .. } => "post_created",
            Self::PostUpdated { .. } => "post_updated",
            Self::PostDeleted { .. } => "post_deleted",
            Self::Liked { .. } => "liked",
            Self::Unliked { .. } => "unliked",
            Self::Favorited { .. } => "favorited",
            Self::Unfavorited { .. } => "unfavorited",
            Self::Reposted { .. } => "reposted",
            Self::Unreposted { .. } => "unreposted",
            Self::Followed { .. } => "followed",
            Self::Unfollowed { .. } => "unfollowed",
            Self::SessionDeleted { .. } => "session_deleted",
            Self::SessionExpiryUpdated { .. } => "session_expiry_updated",
            Self::UserUpdated { .. } => "user_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(CacheKey),
    Pattern(KeyPattern),
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Pattern(pattern) => write!(f, "{pattern}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub mutation: &'static str,
    pub steps: Vec<Invalidation>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidationPlan {{ {}: [", self.mutation)?;
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{step}")?;
        }
        f.write_str("] }")
    }
}

impl InvalidationPlan {
    pub fn for_mutation(mutation: &Mutation) -> Self {
        use Invalidation::{Key, Pattern};

        let steps = match mutation {
            Mutation::PostCreated { author_id } => vec![
                Key(CacheKey::UserPosts(*author_id)),
                Pattern(KeyPattern::FeedPages(*author_id)),
            ],
            Mutation::PostUpdated { post_id, author_id }
            | Mutation::PostDeleted { post_id, author_id } => vec![
                Key(CacheKey::Post(*post_id)),
                Key(CacheKey::UserPosts(*author_id)),
                Pattern(KeyPattern::FeedPages(*author_id)),
            ],
            Mutation::Liked { post_id } | Mutation::Unliked { post_id } => {
                vec![Key(CacheKey::Post(*post_id))]
            }
            Mutation::Favorited { post_id, user_id }
            | Mutation::Unfavorited { post_id, user_id } => vec![
                Key(CacheKey::Post(*post_id)),
                Key(CacheKey::UserFavorites(*user_id)),
            ],
            Mutation::Reposted { post_id, user_id } | Mutation::Unreposted { post_id, user_id } => {
                vec![
                    Key(CacheKey::Post(*post_id)),
                    Key(CacheKey::UserPosts(*user_id)),
                    Key(CacheKey::UserReposts(*user_id)),
                    Pattern(KeyPattern::FeedPages(*user_id)),
                ]
            }
            Mutation::Followed {
                follower_id,
                followee_id,
            }
            | Mutation::Unfollowed {
                follower_id,
                followee_id,
            } => vec![
                Pattern(KeyPattern::FeedPages(*follower_id)),
                Key(CacheKey::User(*follower_id)),
                Key(CacheKey::User(*followee_id)),
            ],
            Mutation::SessionDeleted { session_id }
            | Mutation::SessionExpiryUpdated { session_id } => {
                vec![Key(CacheKey::Session(*session_id))]
            }
            Mutation::UserUpdated {
                user_id,
                old_username,
                new_username,
            } => {
                let mut steps = vec![
                    Key(CacheKey::User(*user_id)),
                    Key(CacheKey::UserByName(old_username.clone())),
                ];
                if new_username != old_username {
                    steps.push(Key(CacheKey::UserByName(new_username.clone())));
                }
                steps
            }
        };

        Self {
            mutation: mutation.name(),
            steps,
        }
    }
}

/// Outcome of one routed mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub steps: usize,
    pub removed: u64,
    pub failures: usize,
}

#[derive(Clone)]
pub struct InvalidationRouter {
    cache: CoherentCache,
}

impl InvalidationRouter {
    pub fn new(cache: CoherentCache) -> Self {
        Self { cache }
    }

    /// Executes the plan for `mutation` step by step, in order.
    pub async fn route(&self, mutation: Mutation) -> InvalidationReport {
        let plan = InvalidationPlan::for_mutation(&mutation);
        let mut report = InvalidationReport {
            steps: plan.steps.len(),
            ..InvalidationReport::default()
        };

        for step in &plan.steps {
            let outcome = match step {
                Invalidation::Key(key) => self.cache.delete(key).await.map(u64::from),
                Invalidation::Pattern(pattern) => self.cache.delete_by_pattern(pattern).await,
            };
            match outcome {
                Ok(removed) => {
                    report.removed += removed;
                    counter!(METRIC_INVALIDATED_KEYS, "mutation" => plan.mutation)
                        .increment(removed);
                }
                Err(err) => {
                    report.failures += 1;
                    warn!(
                        mutation = plan.mutation,
                        target = %step,
                        error = %err,
                        "cache invalidation step failed"
                    );
                    counter!(METRIC_INVALIDATION_FAILURES, "mutation" => plan.mutation)
                        .increment(1);
                }
            }
        }

        debug!(
            plan = %plan,
            removed = report.removed,
            failures = report.failures,
            "cache invalidation routed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::cache::{
        config::CacheConfig,
        store::{CacheBackend, CacheError},
    };

    fn keys(plan: &InvalidationPlan) -> Vec<String> {
        plan.steps.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn post_mutations_follow_table_order() {
        let post = Uuid::from_u128(1);
        let author = Uuid::from_u128(2);

        let created = InvalidationPlan::for_mutation(&Mutation::PostCreated { author_id: author });
        assert_eq!(
            keys(&created),
            vec![format!("user:posts:{author}"), format!("user:feed:{author}:*")]
        );

        let updated = InvalidationPlan::for_mutation(&Mutation::PostUpdated {
            post_id: post,
            author_id: author,
        });
        let deleted = InvalidationPlan::for_mutation(&Mutation::PostDeleted {
            post_id: post,
            author_id: author,
        });
        assert_eq!(updated.steps, deleted.steps);
        assert_eq!(
            keys(&updated),
            vec![
                format!("post:{post}"),
                format!("user:posts:{author}"),
                format!("user:feed:{author}:*"),
            ]
        );
    }

    #[test]
    fn engagement_mutations_follow_table_order() {
        let post = Uuid::from_u128(10);
        let user = Uuid::from_u128(11);

        assert_eq!(
            keys(&InvalidationPlan::for_mutation(&Mutation::Liked { post_id: post })),
            vec![format!("post:{post}")]
        );
        assert_eq!(
            keys(&InvalidationPlan::for_mutation(&Mutation::Unfavorited {
                post_id: post,
                user_id: user
            })),
            vec![format!("post:{post}"), format!("user:favorites:{user}")]
        );
        assert_eq!(
            keys(&InvalidationPlan::for_mutation(&Mutation::Reposted {
                post_id: post,
                user_id: user
            })),
            vec![
                format!("post:{post}"),
                format!("user:posts:{user}"),
                format!("user:reposts:{user}"),
                format!("user:feed:{user}:*"),
            ]
        );
    }

    #[test]
    fn follow_invalidates_follower_feed_and_both_profiles() {
        let follower = Uuid::from_u128(20);
        let followee = Uuid::from_u128(21);
        let plan = InvalidationPlan::for_mutation(&Mutation::Unfollowed {
            follower_id: follower,
            followee_id: followee,
        });
        assert_eq!(
            keys(&plan),
            vec![
                format!("user:feed:{follower}:*"),
                format!("user:{follower}"),
                format!("user:{followee}"),
            ]
        );
    }

    #[test]
    fn user_rename_drops_both_name_keys() {
        let user = Uuid::from_u128(30);
        let renamed = InvalidationPlan::for_mutation(&Mutation::UserUpdated {
            user_id: user,
            old_username: "old".into(),
            new_username: "new".into(),
        });
        assert_eq!(
            keys(&renamed),
            vec![format!("user:{user}"), "user:name:old".into(), "user:name:new".into()]
        );

        let same = InvalidationPlan::for_mutation(&Mutation::UserUpdated {
            user_id: user,
            old_username: "same".into(),
            new_username: "same".into(),
        });
        assert_eq!(same.steps.len(), 2);
    }

    #[test]
    fn plan_display_lists_steps() {
        let id = Uuid::nil();
        let plan = InvalidationPlan::for_mutation(&Mutation::SessionDeleted { session_id: id });
        assert_eq!(
            plan.to_string(),
            format!("InvalidationPlan {{ session_deleted: [session:{id}] }}")
        );
    }

    #[tokio::test]
    async fn router_removes_planned_entries() {
        let cache = CoherentCache::in_memory(CacheConfig::default());
        let author = Uuid::new_v4();
        let posts_key = CacheKey::UserPosts(author);
        cache.set(&posts_key, &vec![1u32]).await;
        for offset in [0, 20, 40] {
            cache
                .set(
                    &CacheKey::FeedPage {
                        user_id: author,
                        limit: 20,
                        offset,
                    },
                    &offset,
                )
                .await;
        }

        let router = InvalidationRouter::new(cache.clone());
        let report = router
            .route(Mutation::PostCreated { author_id: author })
            .await;

        assert_eq!(report.steps, 2);
        assert_eq!(report.removed, 4);
        assert_eq!(report.failures, 0);
        assert!(!cache.get::<Vec<u32>>(&posts_key).await.is_hit());
    }

    #[tokio::test]
    async fn absent_keys_do_not_count_as_removed() {
        let cache = CoherentCache::in_memory(CacheConfig::default());
        let post = Uuid::new_v4();
        let router = InvalidationRouter::new(cache.clone());

        let cold = router.route(Mutation::Liked { post_id: post }).await;
        assert_eq!((cold.steps, cold.removed, cold.failures), (1, 0, 0));

        cache.set(&CacheKey::Post(post), &1u32).await;
        let warm = router.route(Mutation::Liked { post_id: post }).await;
        assert_eq!(warm.removed, 1);
    }

    struct FlakyBackend;

    #[async_trait]
    impl CacheBackend for FlakyBackend {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::backend("unavailable"))
        }
        async fn delete_by_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
            Ok(0)
        }
        async fn close(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn router_keeps_going_after_a_failed_step() {
        let cache = CoherentCache::new(Arc::new(FlakyBackend), CacheConfig::default());
        let router = InvalidationRouter::new(cache);
        let report = router
            .route(Mutation::Reposted {
                post_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
            })
            .await;
        assert_eq!(report.steps, 4);
        assert_eq!(report.failures, 3);
    }
}
