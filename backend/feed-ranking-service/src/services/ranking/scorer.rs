/// Candidate Scoring
///
/// Composite score for one (viewer, post) pair:
///
/// ```text
/// score = max(0, (0.40·E + 0.25·R + 0.20·S + 0.15·V) × penalties)
/// ```
///
/// E engagement, R recency, S social, V relevance. Every input comes from a
/// `ViewerContext` snapshot, so scoring is pure and CPU-only.
use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::{ContentType, Post};
use crate::services::content_classifier::classify;
use crate::services::profile_builder::BehaviorProfile;
use crate::utils::{exponential_decay, log_compress};

const ENGAGEMENT_WEIGHT: f64 = 0.40;
const RECENCY_WEIGHT: f64 = 0.25;
const SOCIAL_WEIGHT: f64 = 0.20;
const RELEVANCE_WEIGHT: f64 = 0.15;

const FOLLOWED_ENGAGEMENT_WEIGHT: f64 = 0.3;
const FOLLOWED_RECENCY_WEIGHT: f64 = 0.7;

const FOLLOWING_BONUS: f64 = 30.0;
const FRIEND_BONUS: f64 = 50.0;
const MUTUAL_FRIEND_BONUS: f64 = 5.0;
const MUTUAL_FRIEND_CAP: f64 = 20.0;
const PRIOR_INTERACTION_BONUS: f64 = 15.0;

const PREFERRED_TYPE_BONUS: f64 = 20.0;
const LOCATION_BONUS: f64 = 15.0;
const OPTIMAL_HOUR_BONUS: f64 = 10.0;

const SEEN_PENALTY: f64 = 0.1;
const PROLIFIC_AUTHOR_PENALTY: f64 = 0.5;
const LOW_QUALITY_PENALTY: f64 = 0.3;
/// More than this many posts in the trailing 24h triggers the author penalty
const PROLIFIC_AUTHOR_THRESHOLD: u32 = 3;
const MIN_CONTENT_CHARS: usize = 10;
const STALE_WITHOUT_ENGAGEMENT_HOURS: f64 = 6.0;

/// Read-only facts about one viewer, fetched once per request
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub viewer_id: Uuid,
    pub now: DateTime<Utc>,
    pub following: HashSet<Uuid>,
    pub friends: HashSet<Uuid>,
    pub blocked: HashSet<Uuid>,
    /// Mutual friend count per candidate author
    pub mutual_friends: HashMap<Uuid, u32>,
    /// Authors the viewer liked/commented/shared before
    pub interacted_authors: HashSet<Uuid>,
    /// Posts per candidate author in the trailing 24h
    pub author_recent_posts: HashMap<Uuid, u32>,
    /// Posts already served to the viewer
    pub seen_posts: HashSet<Uuid>,
    /// Posts whose location is relevant to the viewer
    pub location_relevant: HashSet<Uuid>,
    pub profile: Option<BehaviorProfile>,
}

impl ViewerContext {
    pub fn new(viewer_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            viewer_id,
            now,
            following: HashSet::new(),
            friends: HashSet::new(),
            blocked: HashSet::new(),
            mutual_friends: HashMap::new(),
            interacted_authors: HashSet::new(),
            author_recent_posts: HashMap::new(),
            seen_posts: HashSet::new(),
            location_relevant: HashSet::new(),
            profile: None,
        }
    }
}

/// Scored candidate post, transient within one ranking call
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub post: Post,
    pub content_type: ContentType,
    pub score: f64,
}

/// `log10(rate + 1) × 10` with `rate = (likes + 2·comments + 3·shares) / (hours + 1)`
pub fn engagement_score(post: &Post, now: DateTime<Utc>) -> f64 {
    let weighted = post.like_count as f64
        + 2.0 * post.comment_count as f64
        + 3.0 * post.share_count as f64;
    let rate = weighted / (post.hours_since(now) + 1.0);
    log_compress(rate)
}

/// `exp(-hours / 24) × 100`
pub fn recency_score(post: &Post, now: DateTime<Utc>) -> f64 {
    exponential_decay(post.hours_since(now), 24.0) * 100.0
}

pub fn social_score(author_id: Uuid, ctx: &ViewerContext) -> f64 {
    let mut score = 0.0;

    if ctx.following.contains(&author_id) {
        score += FOLLOWING_BONUS;
    }
    if ctx.friends.contains(&author_id) {
        score += FRIEND_BONUS;
    }

    let mutuals = ctx.mutual_friends.get(&author_id).copied().unwrap_or(0) as f64;
    score += (mutuals * MUTUAL_FRIEND_BONUS).min(MUTUAL_FRIEND_CAP);

    if ctx.interacted_authors.contains(&author_id) {
        score += PRIOR_INTERACTION_BONUS;
    }

    score
}

pub fn relevance_score(post: &Post, content_type: ContentType, ctx: &ViewerContext) -> f64 {
    let mut score = 0.0;

    if let Some(profile) = &ctx.profile {
        if profile.prefers(content_type) {
            score += PREFERRED_TYPE_BONUS;
        }
        if profile.is_optimal_hour(post.created_at.hour() as u8) {
            score += OPTIMAL_HOUR_BONUS;
        }
    }
    if ctx.location_relevant.contains(&post.id) {
        score += LOCATION_BONUS;
    }

    score
}

/// Product of the penalties that apply
pub fn penalty_multiplier(post: &Post, ctx: &ViewerContext) -> f64 {
    let mut multiplier = 1.0;

    if ctx.seen_posts.contains(&post.id) {
        multiplier *= SEEN_PENALTY;
    }

    let recent = ctx
        .author_recent_posts
        .get(&post.author_id)
        .copied()
        .unwrap_or(0);
    if recent > PROLIFIC_AUTHOR_THRESHOLD {
        multiplier *= PROLIFIC_AUTHOR_PENALTY;
    }

    if is_low_quality(post, ctx.now) {
        multiplier *= LOW_QUALITY_PENALTY;
    }

    multiplier
}

/// Very short, or stale with no likes and no comments
pub fn is_low_quality(post: &Post, now: DateTime<Utc>) -> bool {
    let too_short = post.content.chars().count() < MIN_CONTENT_CHARS;
    let stale_and_ignored = post.hours_since(now) > STALE_WITHOUT_ENGAGEMENT_HOURS
        && post.like_count == 0
        && post.comment_count == 0;
    too_short || stale_and_ignored
}

pub fn composite_score(post: &Post, content_type: ContentType, ctx: &ViewerContext) -> f64 {
    let weighted = ENGAGEMENT_WEIGHT * engagement_score(post, ctx.now)
        + RECENCY_WEIGHT * recency_score(post, ctx.now)
        + SOCIAL_WEIGHT * social_score(post.author_id, ctx)
        + RELEVANCE_WEIGHT * relevance_score(post, content_type, ctx);

    (weighted * penalty_multiplier(post, ctx)).max(0.0)
}

pub fn score_candidate(post: Post, ctx: &ViewerContext) -> ScoredCandidate {
    let content_type = classify(&post);
    let score = composite_score(&post, content_type, ctx);
    ScoredCandidate {
        post,
        content_type,
        score,
    }
}

/// `0.3·E + 0.7·R`, used for the followed feed
pub fn followed_score(post: &Post, now: DateTime<Utc>) -> f64 {
    FOLLOWED_ENGAGEMENT_WEIGHT * engagement_score(post, now)
        + FOLLOWED_RECENCY_WEIGHT * recency_score(post, now)
}

/// Stable sort by score descending; NaN sorts last
pub fn sort_by_score_desc(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => b
            .score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal),
    });
}

/// Window used by the prolific-author penalty
pub fn author_activity_window() -> Duration {
    Duration::hours(24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use crate::services::profile_builder::RetentionRisk;
    use std::collections::BTreeMap;

    fn post(hours_old: i64, likes: u32, comments: u32, shares: u32, now: DateTime<Utc>) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: now - Duration::hours(hours_old),
            content: "a reasonably long post body".to_string(),
            media_urls: vec![],
            location: None,
            visibility: Visibility::Public,
            is_active: true,
            like_count: likes,
            comment_count: comments,
            share_count: shares,
        }
    }

    #[test]
    fn test_engagement_reference_value() {
        let now = Utc::now();
        let p = post(1, 10, 2, 0, now);
        // rate = 14 / 2 = 7, log10(8) * 10
        assert!((engagement_score(&p, now) - 9.0309).abs() < 1e-3);
    }

    #[test]
    fn test_recency_fresh_is_hundred() {
        let now = Utc::now();
        assert!((recency_score(&post(0, 0, 0, 0, now), now) - 100.0).abs() < 1e-9);
        let day_old = recency_score(&post(24, 0, 0, 0, now), now);
        assert!((day_old - 100.0 * (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_social_follow_only_is_thirty() {
        let now = Utc::now();
        let author = Uuid::new_v4();
        let mut ctx = ViewerContext::new(Uuid::new_v4(), now);
        ctx.following.insert(author);
        assert_eq!(social_score(author, &ctx), 30.0);
    }

    #[test]
    fn test_social_components_add_up() {
        let now = Utc::now();
        let author = Uuid::new_v4();
        let mut ctx = ViewerContext::new(Uuid::new_v4(), now);
        ctx.following.insert(author);
        ctx.friends.insert(author);
        ctx.mutual_friends.insert(author, 10);
        ctx.interacted_authors.insert(author);
        // 30 + 50 + min(50, 20) + 15
        assert_eq!(social_score(author, &ctx), 115.0);

        ctx.mutual_friends.insert(author, 2);
        assert_eq!(social_score(author, &ctx), 105.0);
    }

    #[test]
    fn test_relevance_uses_profile() {
        let now = Utc::now();
        let p = post(1, 0, 0, 0, now);
        let mut ctx = ViewerContext::new(Uuid::new_v4(), now);
        assert_eq!(relevance_score(&p, ContentType::ShortText, &ctx), 0.0);

        let mut types = BTreeMap::new();
        types.insert(ContentType::ShortText, 4);
        ctx.profile = Some(BehaviorProfile {
            user_id: ctx.viewer_id,
            preferred_content_types: types,
            optimal_hours: vec![p.created_at.hour() as u8],
            preferred_authors: vec![],
            content_diversity_preference: 0.0,
            retention_risk: RetentionRisk::Low,
            computed_at: now,
        });
        ctx.location_relevant.insert(p.id);

        assert_eq!(relevance_score(&p, ContentType::ShortText, &ctx), 45.0);
        assert_eq!(relevance_score(&p, ContentType::Media, &ctx), 25.0);
    }

    #[test]
    fn test_penalties_multiply() {
        let now = Utc::now();
        let mut p = post(1, 5, 0, 0, now);
        let mut ctx = ViewerContext::new(Uuid::new_v4(), now);
        assert_eq!(penalty_multiplier(&p, &ctx), 1.0);

        ctx.seen_posts.insert(p.id);
        ctx.author_recent_posts.insert(p.author_id, 4);
        assert!((penalty_multiplier(&p, &ctx) - 0.05).abs() < 1e-12);

        ctx.author_recent_posts.insert(p.author_id, 3);
        p.content = "short".to_string();
        assert!((penalty_multiplier(&p, &ctx) - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_low_quality_rules() {
        let now = Utc::now();
        assert!(!is_low_quality(&post(5, 0, 0, 0, now), now));
        assert!(is_low_quality(&post(7, 0, 0, 0, now), now));
        assert!(!is_low_quality(&post(7, 0, 1, 0, now), now));
        assert!(is_low_quality(&post(7, 0, 0, 9, now), now));
    }

    #[test]
    fn test_content_length_counts_every_character() {
        let now = Utc::now();
        let mut p = post(1, 0, 0, 0, now);

        p.content = "         x".to_string();
        assert!(!is_low_quality(&p, now));

        p.content = "ünïcödé!!".to_string();
        assert!(is_low_quality(&p, now));
    }

    #[test]
    fn test_composite_decreases_with_age() {
        let now = Utc::now();
        let ctx = ViewerContext::new(Uuid::new_v4(), now);
        let mut previous = f64::INFINITY;
        for hours in 0..=168 {
            let p = post(hours, 10, 2, 1, now);
            let score = composite_score(&p, ContentType::ShortText, &ctx);
            assert!(score <= previous, "score rose at {}h", hours);
            assert!(score >= 0.0);
            previous = score;
        }
    }

    #[test]
    fn test_followed_score_prefers_fresh() {
        let now = Utc::now();
        let fresh = post(1, 0, 0, 0, now);
        let old = post(30, 0, 0, 0, now);
        assert!(followed_score(&fresh, now) > followed_score(&old, now));
    }

    #[test]
    fn test_sort_is_stable_and_nan_last() {
        let now = Utc::now();
        let mk = |score: f64| ScoredCandidate {
            post: post(1, 0, 0, 0, now),
            content_type: ContentType::ShortText,
            score,
        };
        let mut list = vec![mk(1.0), mk(f64::NAN), mk(3.0), mk(1.0)];
        let first_tie = list[0].post.id;
        sort_by_score_desc(&mut list);

        assert_eq!(list[0].score, 3.0);
        assert_eq!(list[1].post.id, first_tie);
        assert!(list[3].score.is_nan());
    }
}
