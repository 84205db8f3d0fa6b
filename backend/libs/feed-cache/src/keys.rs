//! Cache key schema for the ranking engine
//!
//! Key format: v{VERSION}:{entity}:{identifier}[:sub_key]

use uuid::Uuid;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Session Keys =============

    /// Session accumulator for a user
    /// Format: v1:session:{user_id}
    pub fn session(user_id: Uuid) -> String {
        format!("v{}:session:{}", CACHE_VERSION, user_id)
    }

    // ============= Interaction Counters =============

    /// Per-post interaction counter (likes/comments/shares)
    /// Format: v1:post_interactions:{post_id}:{kind}
    pub fn post_interactions(post_id: Uuid, kind: &str) -> String {
        format!("v{}:post_interactions:{}:{}", CACHE_VERSION, post_id, kind)
    }

    /// Per-(user, author) interaction counter
    /// Format: v1:author_interactions:{user_id}:{author_id}
    pub fn author_interactions(user_id: Uuid, author_id: Uuid) -> String {
        format!(
            "v{}:author_interactions:{}:{}",
            CACHE_VERSION, user_id, author_id
        )
    }

    // ============= Feed Keys =============

    /// One memoized feed page
    /// Format: v1:feed:{user_id}:{surface}:{page}:{per_page}
    pub fn feed_page(user_id: Uuid, surface: &str, page: u32, per_page: u32) -> String {
        format!(
            "v{}:feed:{}:{}:{}:{}",
            CACHE_VERSION, user_id, surface, page, per_page
        )
    }

    /// Posts already served to a user
    /// Format: v1:impressions:{user_id}
    pub fn impressions(user_id: Uuid) -> String {
        format!("v{}:impressions:{}", CACHE_VERSION, user_id)
    }

    // ============= Profile Keys =============

    /// Derived behavior profile
    /// Format: v1:behavior_profile:{user_id}
    pub fn behavior_profile(user_id: Uuid) -> String {
        format!("v{}:behavior_profile:{}", CACHE_VERSION, user_id)
    }

    /// Retention metrics snapshot
    /// Format: v1:retention:{user_id}
    pub fn retention_metrics(user_id: Uuid) -> String {
        format!("v{}:retention:{}", CACHE_VERSION, user_id)
    }

    // ============= Utility =============

    /// Extract entity type from key
    pub fn entity_type(key: &str) -> Option<&str> {
        let mut parts = key.split(':');
        parts.next()?;
        parts.next()
    }
}
