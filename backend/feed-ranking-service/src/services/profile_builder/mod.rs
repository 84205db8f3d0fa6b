// ============================================
// Behavior Profile Builder
// ============================================
//
// Read-side computations over the engagement event log:
// - Decayed engagement score over a trailing window
// - Retention metrics (active days/weeks, session averages, trend, risk)
// - Feed optimization profile (content types, hours, authors, diversity)
//
// Architecture:
// ┌──────────────────────────────────────────────┐
// │              ProfileUpdater                  │
// │   (read-through cache, refresh, batching)    │
// ├──────────────────────┬───────────────────────┤
// │   BehaviorBuilder    │      retention        │
// │  (profile from log)  │  (score, metrics)     │
// └──────────────────────┴───────────────────────┘

pub mod behavior_builder;
pub mod profile_updater;
pub mod retention;

pub use behavior_builder::{BehaviorBuilder, BehaviorBuilderConfig, BehaviorProfile};
pub use profile_updater::{ProfileUpdater, ProfileUpdaterConfig};
pub use retention::{
    compute_retention_metrics, engagement_score, event_weight, EngagementTrend, RetentionMetrics,
    RetentionRisk,
};
