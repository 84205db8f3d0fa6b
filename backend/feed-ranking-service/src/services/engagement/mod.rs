// ============================================
// Engagement Recorder
// ============================================
//
// Write side of the engagement store:
// 1. Append typed events to the event log
// 2. Fold events into the user's session accumulator
// 3. Bump short-lived interaction counters in the cache
//    - per post and kind (6h), read back as engagement counters
//    - per (user, author) (30d), read by social scoring
//
// Recording never fails the caller: every side effect that errors is logged,
// counted and dropped.

pub mod session_tracker;

pub use session_tracker::{
    CacheSessionStore, SessionAccumulator, SessionStore, SessionTracker,
};

use chrono::{DateTime, Utc};
use feed_cache::{CacheError, CacheKey, CacheOperations};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::EventLog;
use crate::error::Result;
use crate::metrics;
use crate::models::{EngagementEvent, EventPayload, EventTarget, EventType};

/// Interaction counters for one post over the last 6 hours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInteractionCounts {
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
}

pub struct EngagementRecorder {
    events: Arc<dyn EventLog>,
    cache: Arc<dyn CacheOperations>,
    sessions: SessionTracker,
}

impl EngagementRecorder {
    pub fn new(
        events: Arc<dyn EventLog>,
        cache: Arc<dyn CacheOperations>,
        sessions: SessionTracker,
    ) -> Self {
        Self {
            events,
            cache,
            sessions,
        }
    }

    /// Recorder whose sessions live in the same cache as its counters
    pub fn with_cache_sessions(events: Arc<dyn EventLog>, cache: Arc<dyn CacheOperations>) -> Self {
        let sessions = SessionTracker::new(Arc::new(CacheSessionStore::new(cache.clone())));
        Self::new(events, cache, sessions)
    }

    /// Append one event and apply its side effects.
    ///
    /// Likes, comments and shares also bump the viewer→author counter behind
    /// the prior-interaction bonus. The author is taken from an
    /// `EventTarget::Author` target or from `payload.author_id`; callers that
    /// target a post must put its author in the payload.
    pub async fn record_event(
        &self,
        user_id: Uuid,
        event_type: EventType,
        target: EventTarget,
        payload: EventPayload,
        now: DateTime<Utc>,
    ) {
        let event = EngagementEvent::new(user_id, event_type, target, payload, now);

        match self.events.append(&event).await {
            Ok(()) => metrics::record_event(event_type.as_str()),
            Err(e) => {
                metrics::record_recording_failure("append");
                warn!(user_id = %user_id, event_type = %event_type, error = %e, "Failed to append engagement event");
            }
        }

        if let Err(e) = self.sessions.track(user_id, event_type, &event.target, now).await {
            metrics::record_recording_failure("session");
            warn!(user_id = %user_id, error = %e, "Failed to update session");
        }

        match event_type {
            EventType::PostLike | EventType::PostComment | EventType::PostShare => {
                self.bump_interaction_counters(&event).await;
            }
            EventType::PostView
            | EventType::ProfileView
            | EventType::ScrollDepth
            | EventType::TimeSpent
            | EventType::SessionEnd => {}
        }
    }

    /// Insert a batch as-is; no session or counter side effects
    pub async fn record_bulk(&self, events: &[EngagementEvent]) {
        if events.is_empty() {
            return;
        }

        match self.events.append_bulk(events).await {
            Ok(()) => {
                for event in events {
                    metrics::record_event(event.event_type.as_str());
                }
                debug!(count = events.len(), "Recorded event batch");
            }
            Err(e) => {
                metrics::record_recording_failure("append_bulk");
                warn!(count = events.len(), error = %e, "Failed to record event batch");
            }
        }
    }

    pub async fn start_session(&self, user_id: Uuid, now: DateTime<Utc>) {
        if let Err(e) = self.sessions.start_session(user_id, now).await {
            metrics::record_recording_failure("session");
            warn!(user_id = %user_id, error = %e, "Failed to start session");
        }
    }

    /// Flush the session into a `session_end` event. No-op without a session.
    pub async fn end_session(&self, user_id: Uuid, now: DateTime<Utc>) {
        let event = match self.sessions.end_session(user_id, now).await {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                metrics::record_recording_failure("session");
                warn!(user_id = %user_id, error = %e, "Failed to end session");
                return;
            }
        };

        match self.events.append(&event).await {
            Ok(()) => metrics::record_event(EventType::SessionEnd.as_str()),
            Err(e) => {
                metrics::record_recording_failure("append");
                warn!(user_id = %user_id, error = %e, "Failed to append session_end event");
            }
        }
    }

    pub async fn cached_post_interactions(&self, post_id: Uuid) -> Result<PostInteractionCounts> {
        let (likes, comments, shares) = tokio::try_join!(
            self.read_counter(CacheKey::post_interactions(post_id, EventType::PostLike.as_str())),
            self.read_counter(CacheKey::post_interactions(post_id, EventType::PostComment.as_str())),
            self.read_counter(CacheKey::post_interactions(post_id, EventType::PostShare.as_str())),
        )?;

        Ok(PostInteractionCounts {
            likes,
            comments,
            shares,
        })
    }

    /// Likes, comments and shares `user_id` gave `author_id` in the last 30 days
    pub async fn author_interaction_count(&self, user_id: Uuid, author_id: Uuid) -> Result<i64> {
        self.read_counter(CacheKey::author_interactions(user_id, author_id))
            .await
    }

    async fn read_counter(&self, key: String) -> Result<i64> {
        match self.cache.get_raw(&key).await? {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                CacheError::InvalidData(format!("counter {} is not an integer", key)).into()
            }),
            None => Ok(0),
        }
    }

    async fn bump_interaction_counters(&self, event: &EngagementEvent) {
        if let Some(post_id) = event.target.post_id() {
            let key = CacheKey::post_interactions(post_id, event.event_type.as_str());
            if let Err(e) = self
                .cache
                .incr(&key, 1, feed_cache::ttl::POST_INTERACTIONS)
                .await
            {
                metrics::record_recording_failure("post_counter");
                warn!(post_id = %post_id, error = %e, "Failed to bump post interaction counter");
            }
        }

        let author_id = match event.target {
            EventTarget::Author(id) => Some(id),
            _ => event.payload.author_id,
        };
        let Some(author_id) = author_id else {
            debug!(
                user_id = %event.user_id,
                event_type = %event.event_type,
                "No author on interaction event, author counter not bumped"
            );
            return;
        };

        let key = CacheKey::author_interactions(event.user_id, author_id);
        if let Err(e) = self
            .cache
            .incr(&key, 1, feed_cache::ttl::AUTHOR_INTERACTIONS)
            .await
        {
            metrics::record_recording_failure("author_counter");
            warn!(author_id = %author_id, error = %e, "Failed to bump author interaction counter");
        }
    }
}
