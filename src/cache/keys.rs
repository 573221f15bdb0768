//! Cache key scheme.
//!
//! Maps each cached resource to its key string and each key family to a glob
//! pattern. Keys are opaque to the backend.

use std::fmt;

use uuid::Uuid;

/// Which configured TTL applies to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Resource,
    FeedPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Single post view with aggregate counts.
    Post(Uuid),
    /// Single user profile with follow counts.
    User(Uuid),
    UserByName(String),
    UserPosts(Uuid),
    UserReposts(Uuid),
    UserFavorites(Uuid),
    /// One paginated window of a viewer's feed.
    FeedPage {
        user_id: Uuid,
        limit: u32,
        offset: u32,
    },
    Session(Uuid),
}

impl CacheKey {
    pub fn ttl_class(&self) -> TtlClass {
        match self {
            Self::FeedPage { .. } => TtlClass::FeedPage,
            _ => TtlClass::Resource,
        }
    }

    /// Low-cardinality label used in logs and metrics.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Post(_) => "post",
            Self::User(_) => "user",
            Self::UserByName(_) => "user_name",
            Self::UserPosts(_) => "user_posts",
            Self::UserReposts(_) => "user_reposts",
            Self::UserFavorites(_) => "user_favorites",
            Self::FeedPage { .. } => "feed",
            Self::Session(_) => "session",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(id) => write!(f, "post:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
            Self::UserByName(name) => write!(f, "user:name:{name}"),
            Self::UserPosts(id) => write!(f, "user:posts:{id}"),
            Self::UserReposts(id) => write!(f, "user:reposts:{id}"),
            Self::UserFavorites(id) => write!(f, "user:favorites:{id}"),
            Self::FeedPage {
                user_id,
                limit,
                offset,
            } => write!(f, "user:feed:{user_id}:{limit}:{offset}"),
            Self::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// A family of keys addressed by a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPattern {
    /// Every cached feed window of one viewer.
    FeedPages(Uuid),
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeedPages(user_id) => write!(f, "user:feed:{user_id}:*"),
        }
    }
}

/// Glob match where `*` spans any run (including empty) and `?` exactly one
/// character. Everything else is literal.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    let (mut p, mut c) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some('?') => {
                p += 1;
                c += 1;
            }
            Some(ch) if *ch == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    c = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|ch| *ch == '*')
}
