// ============================================
// Engagement Score & Retention Metrics
// ============================================
//
// Pure functions over an event snapshot. Every function takes the reference
// time explicitly.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::{EngagementEvent, EventType};
use crate::utils::exponential_decay;

/// Per-second weight of `time_spent`
const TIME_SPENT_WEIGHT_PER_SECOND: f64 = 0.1;
/// Relative band around last week's score treated as stable
const TREND_DEADBAND: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionMetrics {
    /// Distinct calendar days (UTC) with activity in the last 7 days
    pub daily_active_days: u32,
    /// Distinct ISO weeks with activity in the last 4 weeks
    pub weekly_active_weeks: u32,
    /// Seconds, mean over `session_end` events in the last 30 days
    pub average_session_duration: f64,
    pub posts_per_session: f64,
    pub engagement_trend: EngagementTrend,
    pub retention_risk: RetentionRisk,
    /// Decayed engagement score over the last 7 days
    pub engagement_score: f64,
    pub last_active_at: Option<DateTime<Utc>>,
}

/// Contribution of one event before decay
pub fn event_weight(event: &EngagementEvent) -> f64 {
    match event.event_type {
        EventType::PostView => 1.0,
        EventType::PostLike => 3.0,
        EventType::PostComment => 5.0,
        EventType::PostShare => 7.0,
        EventType::ProfileView => 2.0,
        EventType::ScrollDepth => 1.0,
        EventType::TimeSpent => {
            event.payload.duration.unwrap_or(0.0).max(0.0) * TIME_SPENT_WEIGHT_PER_SECOND
        }
        EventType::SessionEnd => 0.0,
    }
}

/// `Σ weight × exp(-hoursAgo / (24 × days))` over events in `[at - days, at]`
pub fn engagement_score(events: &[EngagementEvent], days: u32, at: DateTime<Utc>) -> f64 {
    if days == 0 {
        return 0.0;
    }
    let since = at - Duration::days(days as i64);
    let scale_hours = 24.0 * days as f64;

    events
        .iter()
        .filter(|e| e.created_at >= since && e.created_at <= at)
        .map(|e| {
            let hours_ago = (at - e.created_at).num_seconds() as f64 / 3600.0;
            event_weight(e) * exponential_decay(hours_ago, scale_hours)
        })
        .sum()
}

/// This week's score against the week before, with a ±10% deadband
pub fn engagement_trend(events: &[EngagementEvent], now: DateTime<Utc>) -> EngagementTrend {
    let this_week = engagement_score(events, 7, now);
    let prior_week = engagement_score(events, 7, now - Duration::days(7));

    if this_week > prior_week * (1.0 + TREND_DEADBAND) {
        EngagementTrend::Increasing
    } else if this_week < prior_week * (1.0 - TREND_DEADBAND) {
        EngagementTrend::Decreasing
    } else {
        EngagementTrend::Stable
    }
}

pub fn retention_risk(
    last_active_at: Option<DateTime<Utc>>,
    score_7d: f64,
    now: DateTime<Utc>,
) -> RetentionRisk {
    let Some(last_active) = last_active_at else {
        return RetentionRisk::High;
    };
    let days_inactive = (now - last_active).num_seconds() as f64 / 86_400.0;

    if days_inactive > 7.0 || score_7d < 5.0 {
        RetentionRisk::High
    } else if days_inactive > 3.0 || score_7d < 15.0 {
        RetentionRisk::Medium
    } else {
        RetentionRisk::Low
    }
}

/// `events` must cover at least the last 30 days
pub fn compute_retention_metrics(
    events: &[EngagementEvent],
    last_active_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> RetentionMetrics {
    let in_window = |days: i64| {
        let since = now - Duration::days(days);
        events
            .iter()
            .filter(move |e| e.created_at > since && e.created_at <= now)
    };

    let daily_active_days = in_window(7)
        .map(|e| e.created_at.date_naive())
        .collect::<HashSet<_>>()
        .len() as u32;

    let weekly_active_weeks = in_window(28)
        .map(|e| {
            let week = e.created_at.iso_week();
            (week.year(), week.week())
        })
        .collect::<HashSet<_>>()
        .len() as u32;

    let sessions: Vec<&EngagementEvent> = in_window(30)
        .filter(|e| e.event_type == EventType::SessionEnd)
        .collect();
    let (average_session_duration, posts_per_session) = if sessions.is_empty() {
        (0.0, 0.0)
    } else {
        let n = sessions.len() as f64;
        let duration: f64 = sessions
            .iter()
            .map(|e| e.payload.duration.unwrap_or(0.0))
            .sum();
        let posts: f64 = sessions
            .iter()
            .map(|e| e.payload.posts_viewed.unwrap_or(0) as f64)
            .sum();
        (duration / n, posts / n)
    };

    let engagement_score = engagement_score(events, 7, now);

    RetentionMetrics {
        daily_active_days,
        weekly_active_weeks,
        average_session_duration,
        posts_per_session,
        engagement_trend: engagement_trend(events, now),
        retention_risk: retention_risk(last_active_at, engagement_score, now),
        engagement_score,
        last_active_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventPayload, EventTarget};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 22, 18, 0, 0).unwrap()
    }

    fn event(event_type: EventType, hours_ago: i64) -> EngagementEvent {
        EngagementEvent::new(
            Uuid::nil(),
            event_type,
            EventTarget::None,
            EventPayload::default(),
            now() - Duration::hours(hours_ago),
        )
    }

    fn session_end(hours_ago: i64, duration: f64, posts: u32) -> EngagementEvent {
        let mut e = event(EventType::SessionEnd, hours_ago);
        e.payload.duration = Some(duration);
        e.payload.posts_viewed = Some(posts);
        e
    }

    #[test]
    fn test_zero_events_score_zero() {
        assert_eq!(engagement_score(&[], 7, now()), 0.0);
        assert_eq!(engagement_score(&[], 30, now()), 0.0);
    }

    #[test]
    fn test_score_weights_and_decay() {
        let fresh_share = vec![event(EventType::PostShare, 0)];
        assert!((engagement_score(&fresh_share, 7, now()) - 7.0).abs() < 1e-9);

        // 167 hours ago in a 30 day window
        let old_like = vec![event(EventType::PostLike, 24 * 7 - 1)];
        let score = engagement_score(&old_like, 30, now());
        let expected = 3.0 * (-(167.0) / (24.0 * 30.0) as f64).exp();
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_event_at_window_start_counts_at_e_inverse() {
        // exactly `days` old: weight × e^-1
        let like_7d = vec![event(EventType::PostLike, 24 * 7)];
        let score = engagement_score(&like_7d, 7, now());
        assert!((score - 3.0 * (-1.0f64).exp()).abs() < 1e-9);

        let comment_30d = vec![event(EventType::PostComment, 24 * 30)];
        let score = engagement_score(&comment_30d, 30, now());
        assert!((score - 5.0 * (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_time_spent_weight_from_duration() {
        let mut e = event(EventType::TimeSpent, 0);
        e.payload.duration = Some(120.0);
        assert!((event_weight(&e) - 12.0).abs() < 1e-9);

        let missing = event(EventType::TimeSpent, 0);
        assert_eq!(event_weight(&missing), 0.0);
    }

    #[test]
    fn test_events_outside_window_ignored() {
        let events = vec![event(EventType::PostComment, 24 * 8)];
        assert_eq!(engagement_score(&events, 7, now()), 0.0);
    }

    #[test]
    fn test_risk_without_last_active_is_high() {
        assert_eq!(retention_risk(None, 1000.0, now()), RetentionRisk::High);
    }

    #[test]
    fn test_risk_thresholds() {
        let active = Some(now() - Duration::hours(2));
        assert_eq!(retention_risk(active, 20.0, now()), RetentionRisk::Low);
        assert_eq!(retention_risk(active, 10.0, now()), RetentionRisk::Medium);
        assert_eq!(retention_risk(active, 4.0, now()), RetentionRisk::High);

        let four_days = Some(now() - Duration::days(4));
        assert_eq!(retention_risk(four_days, 50.0, now()), RetentionRisk::Medium);

        let eight_days = Some(now() - Duration::days(8));
        assert_eq!(retention_risk(eight_days, 50.0, now()), RetentionRisk::High);
    }

    #[test]
    fn test_trend_deadband() {
        // equal activity both weeks
        let steady = vec![event(EventType::PostLike, 24), event(EventType::PostLike, 24 * 8)];
        assert_eq!(engagement_trend(&steady, now()), EngagementTrend::Stable);

        let rising = vec![event(EventType::PostShare, 24), event(EventType::PostLike, 24 * 8)];
        assert_eq!(engagement_trend(&rising, now()), EngagementTrend::Increasing);

        let falling = vec![event(EventType::PostView, 24), event(EventType::PostShare, 24 * 8)];
        assert_eq!(engagement_trend(&falling, now()), EngagementTrend::Decreasing);

        assert_eq!(engagement_trend(&[], now()), EngagementTrend::Stable);
    }

    #[test]
    fn test_retention_metrics() {
        let events = vec![
            event(EventType::PostView, 1),
            event(EventType::PostView, 2),
            event(EventType::PostLike, 30),
            event(EventType::PostView, 24 * 10),
            session_end(3, 600.0, 12),
            session_end(24 * 20, 300.0, 6),
            session_end(24 * 40, 10_000.0, 100),
        ];
        let metrics = compute_retention_metrics(&events, Some(now() - Duration::hours(1)), now());

        // 2024-05-22 and 2024-05-21
        assert_eq!(metrics.daily_active_days, 2);
        assert!(metrics.weekly_active_weeks >= 2 && metrics.weekly_active_weeks <= 4);
        assert!((metrics.average_session_duration - 450.0).abs() < 1e-9);
        assert!((metrics.posts_per_session - 9.0).abs() < 1e-9);
        assert_eq!(metrics.retention_risk, RetentionRisk::High);
    }

    #[test]
    fn test_no_sessions_means_zero_averages() {
        let metrics = compute_retention_metrics(&[], None, now());
        assert_eq!(metrics.average_session_duration, 0.0);
        assert_eq!(metrics.posts_per_session, 0.0);
        assert_eq!(metrics.daily_active_days, 0);
        assert_eq!(metrics.retention_risk, RetentionRisk::High);
    }
}
