/// Ranking Module
///
/// Scores eligible candidates for one viewer.
///
/// # Architecture
/// - **Eligibility**: active, recent, visible, not own, not blocked
/// - **Scorer**: engagement, recency, social and relevance signals with
///   multiplicative penalties
/// - **Signals**: pluggable impression log and location matcher
/// - **Ranking Layer**: concurrent chunked scoring over a shared snapshot
pub mod eligibility;
pub mod scorer;
pub mod signals;
pub mod simple;

pub use eligibility::is_eligible;
pub use scorer::{
    composite_score, engagement_score, followed_score, recency_score, relevance_score,
    social_score, ScoredCandidate, ViewerContext,
};
pub use signals::{
    CacheImpressionLog, ImpressionLog, LocationMatcher, NoImpressionLog, NoLocationMatcher,
};
pub use simple::RankingLayer;
