// ============================================
// Session Tracker
// ============================================
//
// One SessionAccumulator per user, kept in a SessionStore with an idle TTL
// (2 hours, re-armed on every update). On end the accumulator is turned into a
// single `session_end` event and discarded. An accumulator that expires is
// dropped without producing an event.
//
// Updates for one user are serialized with a per-user async lock so
// concurrent load-modify-save cycles never lose an update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use feed_cache::{CacheKey, CacheOperations, JsonCache};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{EngagementEvent, EventPayload, EventTarget, EventType};

/// In-flight session state for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAccumulator {
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub viewed_post_ids: BTreeSet<Uuid>,
    /// Likes, comments and shares
    pub interactions: u32,
}

impl SessionAccumulator {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            started_at: now,
            last_activity: now,
            viewed_post_ids: BTreeSet::new(),
            interactions: 0,
        }
    }

    pub fn apply(&mut self, event_type: EventType, target: &EventTarget, now: DateTime<Utc>) {
        match event_type {
            EventType::PostView => {
                if let Some(post_id) = target.post_id() {
                    self.viewed_post_ids.insert(post_id);
                }
            }
            EventType::PostLike | EventType::PostComment | EventType::PostShare => {
                self.interactions += 1;
            }
            EventType::ProfileView
            | EventType::ScrollDepth
            | EventType::TimeSpent
            | EventType::SessionEnd => {}
        }
        self.last_activity = now;
    }

    /// Aggregate `session_end` event for this session
    pub fn to_session_end(&self, now: DateTime<Utc>) -> EngagementEvent {
        let duration = (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        let payload = EventPayload {
            duration: Some(duration),
            posts_viewed: Some(self.viewed_post_ids.len() as u32),
            post_ids_viewed: self.viewed_post_ids.iter().copied().collect(),
            interactions: Some(self.interactions),
            ..Default::default()
        };

        EngagementEvent::new(
            self.user_id,
            EventType::SessionEnd,
            EventTarget::None,
            payload,
            now,
        )
    }
}

/// Where accumulators live between events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<Option<SessionAccumulator>>;

    /// Store and (re)arm the idle TTL
    async fn save(&self, session: &SessionAccumulator, ttl_secs: u64) -> Result<()>;

    async fn remove(&self, user_id: Uuid) -> Result<()>;
}

/// Accumulators as JSON entries in the shared cache
pub struct CacheSessionStore {
    cache: Arc<dyn CacheOperations>,
}

impl CacheSessionStore {
    pub fn new(cache: Arc<dyn CacheOperations>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SessionStore for CacheSessionStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<SessionAccumulator>> {
        let session = self
            .cache
            .get_json::<SessionAccumulator>(&CacheKey::session(user_id))
            .await?;
        Ok(session)
    }

    async fn save(&self, session: &SessionAccumulator, ttl_secs: u64) -> Result<()> {
        self.cache
            .set_json(&CacheKey::session(session.user_id), session, ttl_secs)
            .await?;
        Ok(())
    }

    async fn remove(&self, user_id: Uuid) -> Result<()> {
        self.cache.del(&CacheKey::session(user_id)).await?;
        Ok(())
    }
}

pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Idle TTL in seconds (default: 2 hours)
    idle_ttl: u64,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            idle_ttl: feed_cache::ttl::SESSION,
        }
    }

    fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(user_id).or_default().clone()
    }

    /// Drop the lock entry once nobody else holds it
    fn release_lock(&self, user_id: Uuid) {
        self.locks
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Start a fresh session, replacing any unflushed one
    pub async fn start_session(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<SessionAccumulator> {
        let session = SessionAccumulator::new(user_id, now);

        let lock = self.user_lock(user_id);
        let saved = {
            let _guard = lock.lock().await;
            self.store.save(&session, self.idle_ttl).await
        };
        drop(lock);
        self.release_lock(user_id);
        saved?;

        info!(user_id = %user_id, "Session started");
        Ok(session)
    }

    /// Fold one event into the user's session. Returns false when there is
    /// no live session.
    pub async fn track(
        &self,
        user_id: Uuid,
        event_type: EventType,
        target: &EventTarget,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let lock = self.user_lock(user_id);
        let tracked = {
            let _guard = lock.lock().await;
            self.apply_locked(user_id, event_type, target, now).await
        };
        drop(lock);
        self.release_lock(user_id);

        tracked
    }

    async fn apply_locked(
        &self,
        user_id: Uuid,
        event_type: EventType,
        target: &EventTarget,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut session) = self.store.load(user_id).await? else {
            return Ok(false);
        };
        session.apply(event_type, target, now);
        self.store.save(&session, self.idle_ttl).await?;

        debug!(
            user_id = %user_id,
            event_type = %event_type,
            interactions = session.interactions,
            "Session updated"
        );
        Ok(true)
    }

    /// Remove the session and return its `session_end` event, or `None` when
    /// there is no live session
    pub async fn end_session(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<EngagementEvent>> {
        let lock = self.user_lock(user_id);
        let ended = {
            let _guard = lock.lock().await;
            self.end_locked(user_id, now).await
        };
        drop(lock);
        self.release_lock(user_id);

        ended
    }

    async fn end_locked(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<EngagementEvent>> {
        let Some(session) = self.store.load(user_id).await? else {
            return Ok(None);
        };
        self.store.remove(user_id).await?;

        info!(
            user_id = %user_id,
            posts_viewed = session.viewed_post_ids.len(),
            interactions = session.interactions,
            "Session ended"
        );
        Ok(Some(session.to_session_end(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use feed_cache::InMemoryCache;

    fn tracker(cache: &InMemoryCache) -> SessionTracker {
        SessionTracker::new(Arc::new(CacheSessionStore::new(Arc::new(cache.clone()))))
    }

    #[test]
    fn test_accumulator_counts() {
        let now = Utc::now();
        let post = Uuid::new_v4();
        let mut session = SessionAccumulator::new(Uuid::new_v4(), now);

        session.apply(EventType::PostView, &EventTarget::Post(post), now);
        session.apply(EventType::PostView, &EventTarget::Post(post), now);
        session.apply(EventType::PostLike, &EventTarget::Post(post), now);
        session.apply(EventType::ProfileView, &EventTarget::Author(Uuid::new_v4()), now);
        session.apply(EventType::PostView, &EventTarget::None, now);

        assert_eq!(session.viewed_post_ids.len(), 1);
        assert_eq!(session.interactions, 1);
    }

    #[test]
    fn test_session_end_payload() {
        let start = Utc::now();
        let mut session = SessionAccumulator::new(Uuid::new_v4(), start);
        session.apply(EventType::PostView, &EventTarget::Post(Uuid::new_v4()), start);
        session.apply(EventType::PostShare, &EventTarget::Post(Uuid::new_v4()), start);

        let event = session.to_session_end(start + Duration::seconds(90));
        assert_eq!(event.event_type, EventType::SessionEnd);
        assert_eq!(event.payload.duration, Some(90.0));
        assert_eq!(event.payload.posts_viewed, Some(1));
        assert_eq!(event.payload.interactions, Some(1));
        assert_eq!(event.payload.post_ids_viewed.len(), 1);
    }

    #[tokio::test]
    async fn test_end_without_session_is_noop() {
        let cache = InMemoryCache::new();
        let tracker = tracker(&cache);
        assert!(tracker.end_session(Uuid::new_v4(), Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_track_without_session_is_ignored() {
        let cache = InMemoryCache::new();
        let tracker = tracker(&cache);
        let tracked = tracker
            .track(Uuid::new_v4(), EventType::PostLike, &EventTarget::None, Utc::now())
            .await
            .unwrap();
        assert!(!tracked);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_idle_expiry_drops_session() {
        let cache = InMemoryCache::new();
        let tracker = tracker(&cache);
        let user = Uuid::new_v4();
        let now = Utc::now();

        tracker.start_session(user, now).await.unwrap();
        cache.advance(std::time::Duration::from_secs(feed_cache::ttl::SESSION + 1));

        assert!(tracker.end_session(user, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activity_rearms_idle_ttl() {
        let cache = InMemoryCache::new();
        let tracker = tracker(&cache);
        let user = Uuid::new_v4();
        let now = Utc::now();

        tracker.start_session(user, now).await.unwrap();
        cache.advance(std::time::Duration::from_secs(90 * 60));
        tracker
            .track(user, EventType::PostComment, &EventTarget::None, now)
            .await
            .unwrap();
        cache.advance(std::time::Duration::from_secs(90 * 60));

        let ended = tracker.end_session(user, now).await.unwrap().unwrap();
        assert_eq!(ended.payload.interactions, Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let cache = InMemoryCache::new();
        let tracker = Arc::new(tracker(&cache));
        let user = Uuid::new_v4();
        let now = Utc::now();
        tracker.start_session(user, now).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    tracker
                        .track(user, EventType::PostLike, &EventTarget::None, now)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let ended = tracker.end_session(user, now).await.unwrap().unwrap();
        assert_eq!(ended.payload.interactions, Some(50));
        assert!(tracker.locks.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let mut store = MockSessionStore::new();
        store
            .expect_load()
            .returning(|_| Err(crate::error::FeedError::Upstream("cache down".into())));

        let tracker = SessionTracker::new(Arc::new(store));
        let result = tracker
            .track(Uuid::new_v4(), EventType::PostView, &EventTarget::None, Utc::now())
            .await;
        assert!(result.is_err());
    }
}
