// ============================================
// Behavior Builder
// ============================================
//
// Derives the feed optimization profile from a snapshot of the event log:
// which content types the user interacts with, at which hours, with whom,
// and how varied their taste is.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::retention::RetentionRisk;
use crate::models::{ContentType, EngagementEvent};
use crate::utils::normalized_entropy;

/// Per-user feed optimization profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub user_id: Uuid,
    /// Interactions per content type
    pub preferred_content_types: BTreeMap<ContentType, u32>,
    /// Hours of day (UTC), most interactions first
    pub optimal_hours: Vec<u8>,
    /// Most interacted-with authors first
    pub preferred_authors: Vec<Uuid>,
    /// Normalized entropy of `preferred_content_types` (0..1)
    pub content_diversity_preference: f64,
    pub retention_risk: RetentionRisk,
    pub computed_at: DateTime<Utc>,
}

impl BehaviorProfile {
    pub fn prefers(&self, content_type: ContentType) -> bool {
        self.preferred_content_types
            .get(&content_type)
            .is_some_and(|&count| count > 0)
    }

    pub fn is_optimal_hour(&self, hour: u8) -> bool {
        self.optimal_hours.contains(&hour)
    }
}

/// Configuration for behavior profile building
#[derive(Debug, Clone)]
pub struct BehaviorBuilderConfig {
    /// Days to look back for analysis
    pub lookback_days: i64,
    pub optimal_hour_count: usize,
    pub preferred_author_count: usize,
    /// Diversity appetite reported when there is no histogram yet
    pub default_diversity: f64,
}

impl Default for BehaviorBuilderConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            optimal_hour_count: 6,
            preferred_author_count: 20,
            default_diversity: 0.5,
        }
    }
}

pub struct BehaviorBuilder {
    config: BehaviorBuilderConfig,
}

impl BehaviorBuilder {
    pub fn new(config: BehaviorBuilderConfig) -> Self {
        Self { config }
    }

    /// Build the profile from `events` (any order, may contain events outside
    /// the lookback window)
    pub fn build_profile(
        &self,
        user_id: Uuid,
        events: &[EngagementEvent],
        retention_risk: RetentionRisk,
        now: DateTime<Utc>,
    ) -> BehaviorProfile {
        let since = now - Duration::days(self.config.lookback_days);
        let interactions: Vec<&EngagementEvent> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| e.event_type.is_interaction())
            .filter(|e| e.created_at >= since && e.created_at <= now)
            .collect();

        let preferred_content_types = Self::content_type_histogram(&interactions);
        let content_diversity_preference =
            normalized_entropy(preferred_content_types.values().copied())
                .unwrap_or(self.config.default_diversity);

        BehaviorProfile {
            user_id,
            optimal_hours: self.compute_optimal_hours(&interactions),
            preferred_authors: self.compute_preferred_authors(&interactions),
            preferred_content_types,
            content_diversity_preference,
            retention_risk,
            computed_at: now,
        }
    }

    fn content_type_histogram(interactions: &[&EngagementEvent]) -> BTreeMap<ContentType, u32> {
        let mut histogram = BTreeMap::new();
        for event in interactions {
            if let Some(content_type) = event.payload.content_type {
                *histogram.entry(content_type).or_insert(0) += 1;
            }
        }
        histogram
    }

    /// Hours with at least one interaction, count descending, ties by hour
    fn compute_optimal_hours(&self, interactions: &[&EngagementEvent]) -> Vec<u8> {
        let mut hour_counts: [u32; 24] = [0; 24];
        for event in interactions {
            hour_counts[event.created_at.hour() as usize] += 1;
        }

        let mut hours: Vec<(u8, u32)> = hour_counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(h, &c)| (h as u8, c))
            .collect();
        hours.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        hours
            .into_iter()
            .take(self.config.optimal_hour_count)
            .map(|(h, _)| h)
            .collect()
    }

    /// Authors by interaction count descending, ties by id
    fn compute_preferred_authors(&self, interactions: &[&EngagementEvent]) -> Vec<Uuid> {
        let mut counts: HashMap<Uuid, u32> = HashMap::new();
        for event in interactions {
            if let Some(author) = event.payload.author_id {
                *counts.entry(author).or_insert(0) += 1;
            }
        }

        let mut authors: Vec<(Uuid, u32)> = counts.into_iter().collect();
        authors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        authors
            .into_iter()
            .take(self.config.preferred_author_count)
            .map(|(a, _)| a)
            .collect()
    }
}
