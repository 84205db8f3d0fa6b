// ============================================
// Profile Updater
// ============================================
//
// Read-through access to behavior profiles and retention metrics. Each is
// recomputed from an event-log snapshot on a cache miss and cached with its
// own TTL. The refresh job calls `update_user_profile` to overwrite entries
// ahead of expiry.

use chrono::{DateTime, Duration, Utc};
use feed_cache::{CacheKey, CacheOperations, JsonCache};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::behavior_builder::{BehaviorBuilder, BehaviorBuilderConfig, BehaviorProfile};
use super::retention::{self, RetentionMetrics};
use crate::config::RankingConfig;
use crate::db::{ContentStore, EventLog};
use crate::error::Result;
use crate::models::EngagementEvent;

/// Retention metrics look back 30 days and the trend needs two full weeks
const MIN_SNAPSHOT_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct ProfileUpdaterConfig {
    pub history_window_days: i64,
    /// 0 disables profile caching
    pub profile_cache_ttl_secs: u64,
    /// 0 disables retention caching
    pub retention_cache_ttl_secs: u64,
}

impl Default for ProfileUpdaterConfig {
    fn default() -> Self {
        Self {
            history_window_days: 30,
            profile_cache_ttl_secs: feed_cache::ttl::BEHAVIOR_PROFILE,
            retention_cache_ttl_secs: feed_cache::ttl::RETENTION,
        }
    }
}

impl From<&RankingConfig> for ProfileUpdaterConfig {
    fn from(config: &RankingConfig) -> Self {
        Self {
            history_window_days: config.history_window_days,
            profile_cache_ttl_secs: config.profile_cache_ttl_secs,
            retention_cache_ttl_secs: config.retention_cache_ttl_secs,
        }
    }
}

/// Event-log snapshot for one user
struct UserSnapshot {
    events: Vec<EngagementEvent>,
    last_active_at: Option<DateTime<Utc>>,
}

pub struct ProfileUpdater {
    events: Arc<dyn EventLog>,
    content: Arc<dyn ContentStore>,
    cache: Arc<dyn CacheOperations>,
    behavior_builder: BehaviorBuilder,
    config: ProfileUpdaterConfig,
}

impl ProfileUpdater {
    pub fn new(
        events: Arc<dyn EventLog>,
        content: Arc<dyn ContentStore>,
        cache: Arc<dyn CacheOperations>,
        config: ProfileUpdaterConfig,
    ) -> Self {
        let behavior_builder = BehaviorBuilder::new(BehaviorBuilderConfig {
            lookback_days: config.history_window_days,
            ..Default::default()
        });

        Self {
            events,
            content,
            cache,
            behavior_builder,
            config,
        }
    }

    /// Decayed engagement score over the trailing `days`
    pub async fn engagement_score(&self, user_id: Uuid, days: u32, now: DateTime<Utc>) -> Result<f64> {
        let events = self
            .events
            .events_since(user_id, now - Duration::days(days as i64))
            .await?;
        Ok(retention::engagement_score(&events, days, now))
    }

    pub async fn retention_metrics(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<RetentionMetrics> {
        let key = CacheKey::retention_metrics(user_id);
        if self.config.retention_cache_ttl_secs > 0 {
            if let Some(metrics) = self.cache.get_json::<RetentionMetrics>(&key).await? {
                debug!(user_id = %user_id, "Retention metrics cache hit");
                return Ok(metrics);
            }
        }

        let snapshot = self.load_snapshot(user_id, now).await?;
        let metrics = retention::compute_retention_metrics(&snapshot.events, snapshot.last_active_at, now);

        if self.config.retention_cache_ttl_secs > 0 {
            self.cache
                .set_json(&key, &metrics, self.config.retention_cache_ttl_secs)
                .await?;
        }

        Ok(metrics)
    }

    pub async fn behavior_profile(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<BehaviorProfile> {
        if let Some(profile) = self.load_profile_from_cache(user_id).await? {
            debug!(user_id = %user_id, "Behavior profile cache hit");
            return Ok(profile);
        }

        self.update_user_profile(user_id, now).await
    }

    /// Recompute the behavior profile and retention metrics and overwrite
    /// their cache entries
    pub async fn update_user_profile(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<BehaviorProfile> {
        let snapshot = self.load_snapshot(user_id, now).await?;
        let metrics = retention::compute_retention_metrics(&snapshot.events, snapshot.last_active_at, now);
        let profile = self.behavior_builder.build_profile(
            user_id,
            &snapshot.events,
            metrics.retention_risk,
            now,
        );

        if self.config.profile_cache_ttl_secs > 0 {
            self.cache
                .set_json(
                    &CacheKey::behavior_profile(user_id),
                    &profile,
                    self.config.profile_cache_ttl_secs,
                )
                .await?;
        }
        if self.config.retention_cache_ttl_secs > 0 {
            self.cache
                .set_json(
                    &CacheKey::retention_metrics(user_id),
                    &metrics,
                    self.config.retention_cache_ttl_secs,
                )
                .await?;
        }

        debug!(
            user_id = %user_id,
            event_count = snapshot.events.len(),
            author_count = profile.preferred_authors.len(),
            "Behavior profile rebuilt"
        );

        Ok(profile)
    }

    /// Refresh profiles one by one; failures are logged and skipped.
    /// Returns the number refreshed.
    pub async fn batch_update_profiles(&self, user_ids: &[Uuid], now: DateTime<Utc>) -> usize {
        let mut success_count = 0;
        let mut error_count = 0;

        for user_id in user_ids {
            match self.update_user_profile(*user_id, now).await {
                Ok(_) => success_count += 1,
                Err(e) => {
                    error_count += 1;
                    warn!(
                        user_id = %user_id,
                        error = %e,
                        "Failed to update user profile"
                    );
                }
            }
        }

        info!(
            success_count = success_count,
            error_count = error_count,
            "Batch profile update completed"
        );

        success_count
    }

    pub async fn load_profile_from_cache(&self, user_id: Uuid) -> Result<Option<BehaviorProfile>> {
        if self.config.profile_cache_ttl_secs == 0 {
            return Ok(None);
        }
        Ok(self
            .cache
            .get_json::<BehaviorProfile>(&CacheKey::behavior_profile(user_id))
            .await?)
    }

    async fn load_snapshot(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UserSnapshot> {
        let days = self.config.history_window_days.max(MIN_SNAPSHOT_DAYS);
        let since = now - Duration::days(days);

        let (events, last_active_at) = tokio::try_join!(
            self.events.events_since(user_id, since),
            self.content.last_active_at(user_id),
        )?;

        Ok(UserSnapshot {
            events,
            last_active_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockContentStore, MockEventLog};
    use crate::error::FeedError;
    use crate::models::{EventPayload, EventTarget, EventType};
    use crate::services::profile_builder::RetentionRisk;
    use feed_cache::InMemoryCache;

    fn like(user: Uuid, author: Uuid, at: DateTime<Utc>) -> EngagementEvent {
        EngagementEvent::new(
            user,
            EventType::PostLike,
            EventTarget::Post(Uuid::new_v4()),
            EventPayload {
                author_id: Some(author),
                ..Default::default()
            },
            at,
        )
    }

    fn updater(events: MockEventLog, content: MockContentStore) -> ProfileUpdater {
        ProfileUpdater::new(
            Arc::new(events),
            Arc::new(content),
            Arc::new(InMemoryCache::new()),
            ProfileUpdaterConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_profile_read_through_hits_cache() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let author = Uuid::new_v4();

        let mut events = MockEventLog::new();
        events
            .expect_events_since()
            .times(1)
            .returning(move |_, _| Ok(vec![like(user, author, now)]));
        let mut content = MockContentStore::new();
        content
            .expect_last_active_at()
            .times(1)
            .returning(move |_| Ok(Some(now)));

        let updater = updater(events, content);
        let first = updater.behavior_profile(user, now).await.unwrap();
        let second = updater.behavior_profile(user, now).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.preferred_authors, vec![author]);
    }

    #[tokio::test]
    async fn test_retention_is_cached_alongside_profile() {
        let now = Utc::now();
        let user = Uuid::new_v4();

        let mut events = MockEventLog::new();
        events
            .expect_events_since()
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let mut content = MockContentStore::new();
        content.expect_last_active_at().times(1).returning(|_| Ok(None));

        let updater = updater(events, content);
        updater.update_user_profile(user, now).await.unwrap();
        let metrics = updater.retention_metrics(user, now).await.unwrap();

        assert_eq!(metrics.retention_risk, RetentionRisk::High);
        assert_eq!(metrics.engagement_score, 0.0);
    }

    #[tokio::test]
    async fn test_event_log_failure_propagates() {
        let mut events = MockEventLog::new();
        events
            .expect_events_since()
            .returning(|_, _| Err(FeedError::Upstream("event log down".into())));
        let mut content = MockContentStore::new();
        content.expect_last_active_at().returning(|_| Ok(None));

        let updater = updater(events, content);
        let err = updater
            .behavior_profile(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_batch_update_skips_failures() {
        let good = Uuid::new_v4();
        let bad = Uuid::new_v4();

        let mut events = MockEventLog::new();
        events.expect_events_since().returning(move |user, _| {
            if user == bad {
                Err(FeedError::Upstream("timeout".into()))
            } else {
                Ok(vec![])
            }
        });
        let mut content = MockContentStore::new();
        content.expect_last_active_at().returning(|_| Ok(None));

        let updater = updater(events, content);
        let refreshed = updater.batch_update_profiles(&[good, bad], Utc::now()).await;
        assert_eq!(refreshed, 1);
    }

    #[tokio::test]
    async fn test_zero_events_engagement_score() {
        let mut events = MockEventLog::new();
        events.expect_events_since().returning(|_, _| Ok(vec![]));

        let updater = updater(events, MockContentStore::new());
        let score = updater
            .engagement_score(Uuid::new_v4(), 30, Utc::now())
            .await
            .unwrap();
        assert_eq!(score, 0.0);
    }
}
