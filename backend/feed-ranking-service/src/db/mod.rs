/// Collaborator contracts
///
/// The engine owns neither posts nor the social graph. It reads them through
/// `ContentStore` and appends/reads engagement history through `EventLog`.
pub mod content_repo;
pub mod event_repo;
pub mod memory;

pub use content_repo::PgContentStore;
pub use event_repo::PgEventLog;
pub use memory::{InMemoryContentStore, InMemoryEventLog};

use crate::error::Result;
use crate::models::{EngagementEvent, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Active posts created since `since`, not by `viewer`, not by any of
    /// `excluded_authors`, visible to `viewer` (public, or friends-only from an
    /// accepted friend).
    async fn candidate_posts(
        &self,
        viewer: Uuid,
        since: DateTime<Utc>,
        excluded_authors: &[Uuid],
    ) -> Result<Vec<Post>>;

    /// Active posts by authors the viewer follows or is friends with, visible to
    /// the viewer. No recency cutoff.
    async fn followed_posts(&self, viewer: Uuid) -> Result<Vec<Post>>;

    /// Newest active public posts not authored by `exclude_author`
    async fn recent_public_posts(&self, exclude_author: Uuid, limit: usize)
        -> Result<Vec<Post>>;

    /// Users `viewer` follows
    async fn following_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>>;

    /// Accepted friends of `viewer`
    async fn friend_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>>;

    /// Users `viewer` has blocked
    async fn blocked_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>>;

    async fn mutual_friend_count(&self, viewer: Uuid, other: Uuid) -> Result<u32>;

    /// Posts `author` created since `since` (any visibility)
    async fn author_post_count_since(&self, author: Uuid, since: DateTime<Utc>) -> Result<u32>;

    async fn last_active_at(&self, user: Uuid) -> Result<Option<DateTime<Utc>>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: &EngagementEvent) -> Result<()>;

    async fn append_bulk(&self, events: &[EngagementEvent]) -> Result<()>;

    /// Events for `user` created at or after `since`, oldest first
    async fn events_since(&self, user: Uuid, since: DateTime<Utc>)
        -> Result<Vec<EngagementEvent>>;

    async fn count_since(&self, user: Uuid, since: DateTime<Utc>) -> Result<u64>;

    /// Distinct users with at least one event since `since`, stable order
    async fn active_users_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Uuid>>;
}
