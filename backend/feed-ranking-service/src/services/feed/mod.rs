// ============================================
// Feed Service
// ============================================
//
// Caller-facing API of the engine.
//
// For-you feed:
//   GATE_CHECK ──(thin history | no candidates)──▶ FALLBACK ──┐
//        │                                                   ├─▶ PAGINATE
//        └──▶ SCORE ──▶ DIVERSIFY ───────────────────────────┘
//
// Followed feed: followed/friend posts scored by engagement + recency, or
// the same fallback when the viewer follows nobody.
//
// Computed pages are memoized per (viewer, surface, page, per_page). No
// retries: collaborator failures surface as errors.

use chrono::{DateTime, Duration, Utc};
use feed_cache::{CacheKey, CacheOperations, JsonCache};
use futures::future::try_join_all;
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RankingConfig;
use crate::db::{ContentStore, EventLog};
use crate::error::{FeedError, Result};
use crate::metrics;
use crate::models::{EventPayload, EventTarget, EventType, PagedResult, Post, Visibility};
use crate::services::diversity::DiversityLayer;
use crate::services::engagement::EngagementRecorder;
use crate::services::fallback_ranking::fallback_rank_posts;
use crate::services::profile_builder::{
    BehaviorProfile, ProfileUpdater, ProfileUpdaterConfig, RetentionMetrics,
};
use crate::services::ranking::scorer::{author_activity_window, followed_score};
use crate::services::ranking::{
    is_eligible, ImpressionLog, LocationMatcher, NoImpressionLog, NoLocationMatcher, RankingLayer,
    ViewerContext,
};

/// Concurrent per-author lookups while building a snapshot
const AUTHOR_LOOKUP_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSurface {
    ForYou,
    Followed,
}

impl FeedSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForYou => "for_you",
            Self::Followed => "followed",
        }
    }
}

/// How a page was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPath {
    Ranked,
    Fallback,
    Cached,
}

impl FeedPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ranked => "ranked",
            Self::Fallback => "fallback",
            Self::Cached => "cached",
        }
    }
}

pub struct FeedService {
    content: Arc<dyn ContentStore>,
    events: Arc<dyn EventLog>,
    cache: Arc<dyn CacheOperations>,
    recorder: Arc<EngagementRecorder>,
    profiles: Arc<ProfileUpdater>,
    impressions: Arc<dyn ImpressionLog>,
    location: Arc<dyn LocationMatcher>,
    ranking: RankingLayer,
    diversity: DiversityLayer,
    config: RankingConfig,
}

impl FeedService {
    pub fn new(
        content: Arc<dyn ContentStore>,
        events: Arc<dyn EventLog>,
        cache: Arc<dyn CacheOperations>,
        config: RankingConfig,
    ) -> Self {
        let recorder = Arc::new(EngagementRecorder::with_cache_sessions(
            events.clone(),
            cache.clone(),
        ));
        let profiles = Arc::new(ProfileUpdater::new(
            events.clone(),
            content.clone(),
            cache.clone(),
            ProfileUpdaterConfig::from(&config),
        ));

        Self {
            content,
            events,
            cache,
            recorder,
            profiles,
            impressions: Arc::new(NoImpressionLog),
            location: Arc::new(NoLocationMatcher),
            ranking: RankingLayer::new(config.scoring_chunk_size),
            diversity: DiversityLayer::default(),
            config,
        }
    }

    pub fn with_impression_log(mut self, impressions: Arc<dyn ImpressionLog>) -> Self {
        self.impressions = impressions;
        self
    }

    pub fn with_location_matcher(mut self, location: Arc<dyn LocationMatcher>) -> Self {
        self.location = location;
        self
    }

    pub fn recorder(&self) -> Arc<EngagementRecorder> {
        self.recorder.clone()
    }

    pub fn profiles(&self) -> Arc<ProfileUpdater> {
        self.profiles.clone()
    }

    // ============================================
    // Feeds
    // ============================================

    pub async fn get_for_you_feed(
        &self,
        viewer_id: Uuid,
        page: u32,
        per_page: u32,
        now: DateTime<Utc>,
    ) -> Result<PagedResult<Post>> {
        self.validate_page(page, per_page)?;
        let surface = FeedSurface::ForYou;
        let started = Instant::now();

        if let Some(cached) = self.cached_page(viewer_id, surface, page, per_page).await? {
            metrics::record_feed_request(surface.as_str(), FeedPath::Cached.as_str());
            return Ok(cached);
        }

        let (path, posts) = self.build_for_you(viewer_id, now).await?;
        let result = PagedResult::from_slice(&posts, page, per_page);

        if path == FeedPath::Ranked {
            let served: Vec<Uuid> = result.items.iter().map(|p| p.id).collect();
            if let Err(e) = self.impressions.record_served(viewer_id, &served).await {
                metrics::record_recording_failure("impressions");
                warn!(viewer_id = %viewer_id, error = %e, "Failed to record impressions");
            }
        }

        self.store_page(viewer_id, surface, &result).await;
        metrics::record_feed_request(surface.as_str(), path.as_str());
        metrics::record_ranking_duration(surface.as_str(), started.elapsed());

        info!(
            viewer_id = %viewer_id,
            path = path.as_str(),
            total = result.total,
            page = page,
            "For-you feed served"
        );

        Ok(result)
    }

    pub async fn get_followed_feed(
        &self,
        viewer_id: Uuid,
        page: u32,
        per_page: u32,
        now: DateTime<Utc>,
    ) -> Result<PagedResult<Post>> {
        self.validate_page(page, per_page)?;
        let surface = FeedSurface::Followed;
        let started = Instant::now();

        if let Some(cached) = self.cached_page(viewer_id, surface, page, per_page).await? {
            metrics::record_feed_request(surface.as_str(), FeedPath::Cached.as_str());
            return Ok(cached);
        }

        let (following, friends) = tokio::try_join!(
            self.content.following_ids(viewer_id),
            self.content.friend_ids(viewer_id),
        )?;

        let (path, posts) = if following.is_empty() && friends.is_empty() {
            (FeedPath::Fallback, self.fallback_feed(viewer_id).await?)
        } else {
            let posts = self.content.followed_posts(viewer_id).await?;
            (
                FeedPath::Ranked,
                rank_followed(posts, &following, &friends, now),
            )
        };

        let result = PagedResult::from_slice(&posts, page, per_page);

        self.store_page(viewer_id, surface, &result).await;
        metrics::record_feed_request(surface.as_str(), path.as_str());
        metrics::record_ranking_duration(surface.as_str(), started.elapsed());

        info!(
            viewer_id = %viewer_id,
            path = path.as_str(),
            total = result.total,
            page = page,
            "Followed feed served"
        );

        Ok(result)
    }

    /// GATE_CHECK then FALLBACK or SCORE + DIVERSIFY. Returns the full list.
    async fn build_for_you(&self, viewer_id: Uuid, now: DateTime<Utc>) -> Result<(FeedPath, Vec<Post>)> {
        let history_since = now - Duration::days(self.config.history_window_days);

        let (event_count, following, friends, blocked) = tokio::try_join!(
            self.events.count_since(viewer_id, history_since),
            self.content.following_ids(viewer_id),
            self.content.friend_ids(viewer_id),
            self.content.blocked_ids(viewer_id),
        )?;

        if event_count < self.config.min_events_for_personalization {
            debug!(viewer_id = %viewer_id, event_count = event_count, "Insufficient history, using fallback");
            return Ok((FeedPath::Fallback, self.fallback_feed(viewer_id).await?));
        }

        let window = Duration::hours(self.config.candidate_window_hours);
        let excluded: Vec<Uuid> = blocked.iter().copied().collect();

        let candidates = self
            .content
            .candidate_posts(viewer_id, now - window, &excluded)
            .await?;

        // social graph snapshot, fetched once per request
        let mut ctx = ViewerContext::new(viewer_id, now);
        ctx.following = following;
        ctx.friends = friends;
        ctx.blocked = blocked;

        let candidates: Vec<Post> = candidates
            .into_iter()
            .filter(|p| is_eligible(p, &ctx, window))
            .collect();

        if candidates.is_empty() {
            debug!(viewer_id = %viewer_id, "No eligible candidates, using fallback");
            return Ok((FeedPath::Fallback, self.fallback_feed(viewer_id).await?));
        }

        self.load_scoring_signals(&mut ctx, &candidates).await?;

        let scored = self
            .ranking
            .rank_candidates(Arc::new(ctx), candidates)
            .await?;
        let diversified = self.diversity.rerank(scored);

        debug!(
            viewer_id = %viewer_id,
            selected = diversified.len(),
            "Candidates diversified"
        );

        Ok((
            FeedPath::Ranked,
            diversified.into_iter().map(|c| c.post).collect(),
        ))
    }

    /// Fill the per-author, per-post and profile parts of the snapshot
    async fn load_scoring_signals(&self, ctx: &mut ViewerContext, candidates: &[Post]) -> Result<()> {
        let viewer_id = ctx.viewer_id;
        let now = ctx.now;
        let activity_since = now - author_activity_window();

        let authors: Vec<Uuid> = candidates
            .iter()
            .map(|p| p.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let author_facts: Vec<(Uuid, u32, u32, i64)> = stream::iter(authors)
            .map(|author| async move {
                let (mutuals, recent_posts, interactions) = tokio::try_join!(
                    self.content.mutual_friend_count(viewer_id, author),
                    self.content.author_post_count_since(author, activity_since),
                    self.recorder.author_interaction_count(viewer_id, author),
                )?;
                Ok::<_, FeedError>((author, mutuals, recent_posts, interactions))
            })
            .buffer_unordered(AUTHOR_LOOKUP_CONCURRENCY)
            .try_collect()
            .await?;

        for (author, mutuals, recent_posts, interactions) in author_facts {
            ctx.mutual_friends.insert(author, mutuals);
            ctx.author_recent_posts.insert(author, recent_posts);
            if interactions > 0 {
                ctx.interacted_authors.insert(author);
            }
        }

        let located = candidates.iter().filter(|p| p.location.is_some());
        let location_checks = try_join_all(located.map(|post| async move {
            let relevant = self.location.is_relevant(viewer_id, post).await?;
            Ok::<_, FeedError>((post.id, relevant))
        }));

        let (profile, seen, location_results) = tokio::try_join!(
            self.profiles.behavior_profile(viewer_id, now),
            self.impressions.seen_posts(viewer_id),
            location_checks,
        )?;

        ctx.profile = Some(profile);
        ctx.seen_posts = seen;
        ctx.location_relevant = location_results
            .into_iter()
            .filter(|(_, relevant)| *relevant)
            .map(|(id, _)| id)
            .collect();

        Ok(())
    }

    async fn fallback_feed(&self, viewer_id: Uuid) -> Result<Vec<Post>> {
        let pool = self
            .content
            .recent_public_posts(viewer_id, self.config.fallback_pool_size)
            .await?;
        Ok(fallback_rank_posts(viewer_id, pool))
    }

    // ============================================
    // Engagement & profiles
    // ============================================

    /// Record one event by wire type name. Unknown types are rejected before
    /// anything is written; recording failures are swallowed.
    pub async fn record_engagement(
        &self,
        user_id: Uuid,
        event_type: &str,
        target: EventTarget,
        payload: EventPayload,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let event_type: EventType = event_type.parse()?;
        self.recorder
            .record_event(user_id, event_type, target, payload, now)
            .await;
        Ok(())
    }

    pub async fn start_session(&self, user_id: Uuid, now: DateTime<Utc>) {
        self.recorder.start_session(user_id, now).await;
    }

    pub async fn end_session(&self, user_id: Uuid, now: DateTime<Utc>) {
        self.recorder.end_session(user_id, now).await;
    }

    pub async fn get_retention_metrics(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<RetentionMetrics> {
        self.profiles.retention_metrics(user_id, now).await
    }

    pub async fn get_feed_optimization_profile(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BehaviorProfile> {
        self.profiles.behavior_profile(user_id, now).await
    }

    // ============================================
    // Helpers
    // ============================================

    fn validate_page(&self, page: u32, per_page: u32) -> Result<()> {
        if page == 0 {
            return Err(FeedError::Validation("page must be >= 1".to_string()));
        }
        if per_page == 0 {
            return Err(FeedError::Validation("per_page must be >= 1".to_string()));
        }
        if per_page > self.config.max_per_page {
            return Err(FeedError::Validation(format!(
                "per_page must be <= {}",
                self.config.max_per_page
            )));
        }
        Ok(())
    }

    async fn cached_page(
        &self,
        viewer_id: Uuid,
        surface: FeedSurface,
        page: u32,
        per_page: u32,
    ) -> Result<Option<PagedResult<Post>>> {
        if self.config.feed_cache_ttl_secs == 0 {
            return Ok(None);
        }
        let key = CacheKey::feed_page(viewer_id, surface.as_str(), page, per_page);
        Ok(self.cache.get_json::<PagedResult<Post>>(&key).await?)
    }

    async fn store_page(&self, viewer_id: Uuid, surface: FeedSurface, result: &PagedResult<Post>) {
        if self.config.feed_cache_ttl_secs == 0 {
            return;
        }
        let key = CacheKey::feed_page(viewer_id, surface.as_str(), result.page, result.per_page);
        if let Err(e) = self
            .cache
            .set_json(&key, result, self.config.feed_cache_ttl_secs)
            .await
        {
            warn!(viewer_id = %viewer_id, surface = surface.as_str(), error = %e, "Failed to cache feed page");
        }
    }
}

/// Visible followed/friend posts by `0.3·E + 0.7·R`, descending
fn rank_followed(
    posts: Vec<Post>,
    following: &HashSet<Uuid>,
    friends: &HashSet<Uuid>,
    now: DateTime<Utc>,
) -> Vec<Post> {
    let mut scored: Vec<(f64, Post)> = posts
        .into_iter()
        .filter(|p| p.is_active)
        .filter(|p| following.contains(&p.author_id) || friends.contains(&p.author_id))
        .filter(|p| match p.visibility {
            Visibility::Public => true,
            Visibility::Friends => friends.contains(&p.author_id),
            Visibility::Private => false,
        })
        .map(|p| (followed_score(&p, now), p))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryContentStore, InMemoryEventLog, MockContentStore, MockEventLog};
    use feed_cache::InMemoryCache;

    fn service_with(content: Arc<dyn ContentStore>, events: Arc<dyn EventLog>) -> FeedService {
        FeedService::new(content, events, Arc::new(InMemoryCache::new()), RankingConfig::default())
    }

    #[tokio::test]
    async fn test_invalid_page_rejected_before_store_access() {
        // no expectations: any store call would panic
        let service = service_with(
            Arc::new(MockContentStore::new()),
            Arc::new(MockEventLog::new()),
        );
        let viewer = Uuid::new_v4();
        let now = Utc::now();

        for (page, per_page) in [(0, 10), (1, 0), (1, 101)] {
            let err = service
                .get_for_you_feed(viewer, page, per_page, now)
                .await
                .unwrap_err();
            assert!(matches!(err, FeedError::Validation(_)));
            let err = service
                .get_followed_feed(viewer, page, per_page, now)
                .await
                .unwrap_err();
            assert!(matches!(err, FeedError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_unknown_event_type_rejected_before_store_access() {
        let service = service_with(
            Arc::new(MockContentStore::new()),
            Arc::new(MockEventLog::new()),
        );
        let err = service
            .record_engagement(
                Uuid::new_v4(),
                "post_bookmark",
                EventTarget::None,
                EventPayload::default(),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_retryable_error() {
        let mut content = MockContentStore::new();
        content
            .expect_following_ids()
            .returning(|_| Err(FeedError::Upstream("content store timeout".into())));
        content.expect_friend_ids().returning(|_| Ok(HashSet::new()));
        content.expect_blocked_ids().returning(|_| Ok(HashSet::new()));
        let mut events = MockEventLog::new();
        events.expect_count_since().returning(|_, _| Ok(50));

        let service = service_with(Arc::new(content), Arc::new(events));
        let err = service
            .get_for_you_feed(Uuid::new_v4(), 1, 20, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_page_is_memoized() {
        let content = Arc::new(InMemoryContentStore::new());
        let events = Arc::new(InMemoryEventLog::new());
        let service = service_with(content.clone(), events);
        let viewer = Uuid::new_v4();
        let now = Utc::now();

        let first = service.get_for_you_feed(viewer, 1, 10, now).await.unwrap();

        // a failing store no longer matters while the page is cached
        content.set_unavailable(true);
        let second = service.get_for_you_feed(viewer, 1, 10, now).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rank_followed_visibility() {
        let now = Utc::now();
        let friend = Uuid::new_v4();
        let followed = Uuid::new_v4();
        let mk = |author: Uuid, visibility: Visibility, hours: i64| Post {
            id: Uuid::new_v4(),
            author_id: author,
            created_at: now - Duration::hours(hours),
            content: "followed feed post".to_string(),
            media_urls: vec![],
            location: None,
            visibility,
            is_active: true,
            like_count: 0,
            comment_count: 0,
            share_count: 0,
        };
        let following: HashSet<Uuid> = [followed].into_iter().collect();
        let friends: HashSet<Uuid> = [friend].into_iter().collect();

        let posts = vec![
            mk(followed, Visibility::Public, 5),
            mk(followed, Visibility::Friends, 1),
            mk(friend, Visibility::Friends, 2),
            mk(friend, Visibility::Private, 0),
            mk(Uuid::new_v4(), Visibility::Public, 0),
        ];

        let ranked = rank_followed(posts, &following, &friends, now);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].author_id, friend);
        assert_eq!(ranked[1].author_id, followed);
    }
}
