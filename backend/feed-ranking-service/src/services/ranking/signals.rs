/// Pluggable ranking signals
///
/// - `ImpressionLog`: which posts a viewer was already served (×0.1 penalty)
/// - `LocationMatcher`: whether a post's location is relevant to a viewer
///
/// Both default to no-ops, which makes the corresponding score terms inert.
use async_trait::async_trait;
use dashmap::DashMap;
use feed_cache::{CacheKey, CacheOperations, JsonCache};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Post;

/// Most recent impressions kept per viewer
const MAX_IMPRESSIONS: usize = 1000;

#[async_trait]
pub trait ImpressionLog: Send + Sync {
    async fn seen_posts(&self, viewer_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn record_served(&self, viewer_id: Uuid, post_ids: &[Uuid]) -> Result<()>;
}

/// Reports nothing as seen; the already-shown penalty never applies
pub struct NoImpressionLog;

#[async_trait]
impl ImpressionLog for NoImpressionLog {
    async fn seen_posts(&self, _viewer_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(HashSet::new())
    }

    async fn record_served(&self, _viewer_id: Uuid, _post_ids: &[Uuid]) -> Result<()> {
        Ok(())
    }
}

/// Served post ids per viewer, kept in the cache for 7 days.
///
/// Writes for one viewer are serialized within this process. Two processes
/// sharing the cache can still overwrite each other's latest page; the log is
/// best effort and a lost impression only skips one ×0.1 penalty.
pub struct CacheImpressionLog {
    cache: Arc<dyn CacheOperations>,
    ttl_secs: u64,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl CacheImpressionLog {
    pub fn new(cache: Arc<dyn CacheOperations>) -> Self {
        Self {
            cache,
            ttl_secs: feed_cache::ttl::IMPRESSIONS,
            locks: DashMap::new(),
        }
    }

    async fn append_locked(&self, viewer_id: Uuid, post_ids: &[Uuid]) -> Result<()> {
        let key = CacheKey::impressions(viewer_id);
        let mut seen = self
            .cache
            .get_json::<Vec<Uuid>>(&key)
            .await?
            .unwrap_or_default();
        seen.retain(|id| !post_ids.contains(id));
        seen.extend_from_slice(post_ids);
        if seen.len() > MAX_IMPRESSIONS {
            seen.drain(..seen.len() - MAX_IMPRESSIONS);
        }

        self.cache.set_json(&key, &seen, self.ttl_secs).await?;
        Ok(())
    }
}

#[async_trait]
impl ImpressionLog for CacheImpressionLog {
    async fn seen_posts(&self, viewer_id: Uuid) -> Result<HashSet<Uuid>> {
        let seen = self
            .cache
            .get_json::<Vec<Uuid>>(&CacheKey::impressions(viewer_id))
            .await?;
        Ok(seen.unwrap_or_default().into_iter().collect())
    }

    async fn record_served(&self, viewer_id: Uuid, post_ids: &[Uuid]) -> Result<()> {
        if post_ids.is_empty() {
            return Ok(());
        }

        let lock = self.locks.entry(viewer_id).or_default().clone();
        let appended = {
            let _guard = lock.lock().await;
            self.append_locked(viewer_id, post_ids).await
        };
        drop(lock);
        self.locks
            .remove_if(&viewer_id, |_, lock| Arc::strong_count(lock) == 1);

        appended
    }
}

#[async_trait]
pub trait LocationMatcher: Send + Sync {
    async fn is_relevant(&self, viewer_id: Uuid, post: &Post) -> Result<bool>;
}

pub struct NoLocationMatcher;

#[async_trait]
impl LocationMatcher for NoLocationMatcher {
    async fn is_relevant(&self, _viewer_id: Uuid, _post: &Post) -> Result<bool> {
        Ok(false)
    }
}
