//! Feed Ranking Metrics
//!
//! Prometheus metrics for feed requests, engagement recording and the profile
//! refresh job. Registered in the default registry on first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::time::Duration;

static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_requests_total",
        "Feed requests served, by surface and path (personalized/fallback/cached)",
        &["surface", "path"]
    )
    .expect("Failed to register feed requests metric")
});

static FEED_RANKING_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_ranking_duration_seconds",
        "Time spent building a feed page",
        &["surface"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register feed ranking duration metric")
});

static EVENTS_RECORDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engagement_events_recorded_total",
        "Engagement events appended to the log",
        &["event_type"]
    )
    .expect("Failed to register engagement events metric")
});

static RECORDING_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engagement_recording_failures_total",
        "Recording side effects that failed and were dropped",
        &["operation"]
    )
    .expect("Failed to register engagement recording failures metric")
});

static PROFILE_REFRESH_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "profile_refresh_runs_total",
        "Profile refresh cycles (success/error)",
        &["status"]
    )
    .expect("Failed to register profile refresh runs metric")
});

static PROFILE_REFRESH_USERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "profile_refresh_users",
        "Users refreshed in the last profile refresh cycle"
    )
    .expect("Failed to register profile refresh users metric")
});

pub fn record_feed_request(surface: &str, path: &str) {
    FEED_REQUESTS_TOTAL.with_label_values(&[surface, path]).inc();
}

pub fn record_ranking_duration(surface: &str, duration: Duration) {
    FEED_RANKING_DURATION_SECONDS
        .with_label_values(&[surface])
        .observe(duration.as_secs_f64());
}

pub fn record_event(event_type: &str) {
    EVENTS_RECORDED_TOTAL.with_label_values(&[event_type]).inc();
}

/// Record a swallowed failure (append/counter/session)
pub fn record_recording_failure(operation: &str) {
    RECORDING_FAILURES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn record_profile_refresh_run(status: &str) {
    PROFILE_REFRESH_RUNS_TOTAL.with_label_values(&[status]).inc();
}

pub fn set_profile_refresh_users(count: i64) {
    PROFILE_REFRESH_USERS.set(count);
}
