//! Cache metrics
//!
//! Labelled by key entity (see [`CacheEntity`]) and cache operation. Unknown
//! key shapes collapse into `other` so label cardinality stays fixed.

use crate::CacheKey;
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

/// What a key stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntity {
    Session,
    PostCounter,
    AuthorCounter,
    FeedPage,
    Impressions,
    BehaviorProfile,
    Retention,
    Other,
}

impl CacheEntity {
    pub fn from_key(key: &str) -> Self {
        match CacheKey::entity_type(key) {
            Some("session") => Self::Session,
            Some("post_interactions") => Self::PostCounter,
            Some("author_interactions") => Self::AuthorCounter,
            Some("feed") => Self::FeedPage,
            Some("impressions") => Self::Impressions,
            Some("behavior_profile") => Self::BehaviorProfile,
            Some("retention") => Self::Retention,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::PostCounter => "post_counter",
            Self::AuthorCounter => "author_counter",
            Self::FeedPage => "feed_page",
            Self::Impressions => "impressions",
            Self::BehaviorProfile => "behavior_profile",
            Self::Retention => "retention",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Get,
    Set,
    Incr,
    Del,
}

impl CacheOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Incr => "incr",
            Self::Del => "del",
        }
    }
}

struct CacheMetricsInner {
    lookups: IntCounterVec,
    mutations: IntCounterVec,
    errors: IntCounterVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            lookups: IntCounterVec::new(
                Opts::new("feed_cache_lookups_total", "Cache reads by entity and outcome"),
                &["entity", "outcome"],
            )
            .expect("valid metric definition"),
            mutations: IntCounterVec::new(
                Opts::new(
                    "feed_cache_mutations_total",
                    "Cache sets, counter increments and deletes by entity",
                ),
                &["entity", "operation"],
            )
            .expect("valid metric definition"),
            errors: IntCounterVec::new(
                Opts::new("feed_cache_errors_total", "Failed cache operations"),
                &["entity", "operation"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.lookups.clone()))?;
        registry.register(Box::new(self.mutations.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Handle used by cache implementations
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Expose the cache counters through `registry`
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_lookup(&self, key: &str, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        get_metrics()
            .lookups
            .with_label_values(&[CacheEntity::from_key(key).as_str(), outcome])
            .inc();
    }

    pub fn record_mutation(&self, key: &str, op: CacheOp) {
        get_metrics()
            .mutations
            .with_label_values(&[CacheEntity::from_key(key).as_str(), op.as_str()])
            .inc();
    }

    pub fn record_error(&self, key: &str, op: CacheOp) {
        get_metrics()
            .errors
            .with_label_values(&[CacheEntity::from_key(key).as_str(), op.as_str()])
            .inc();
    }
}
