// ============================================
// Profile Refresh Job
// ============================================
//
// Periodically rebuilds behavior profiles and retention metrics for users
// with recent engagement so feed requests hit a warm cache.
//
// Workflow:
// 1. Page through users active in the last `active_days` from the event log
// 2. Refresh each page via ProfileUpdater::batch_update_profiles
// 3. Sleep `interval_secs`, unless running once

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::ProfileJobConfig;
use crate::db::EventLog;
use crate::error::Result;
use crate::metrics;
use crate::services::profile_builder::ProfileUpdater;

/// Stats for one refresh pass
#[derive(Debug, Clone, Default)]
pub struct RefreshStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub users_processed: usize,
    pub users_succeeded: usize,
    pub users_failed: usize,
    pub batches: usize,
    pub total_duration_ms: u64,
}

pub struct ProfileRefreshJob {
    config: ProfileJobConfig,
    events: Arc<dyn EventLog>,
    updater: Arc<ProfileUpdater>,
}

impl ProfileRefreshJob {
    pub fn new(config: ProfileJobConfig, events: Arc<dyn EventLog>, updater: Arc<ProfileUpdater>) -> Self {
        Self {
            config,
            events,
            updater,
        }
    }

    /// Run passes until `run_once` or forever. A failed pass is logged and
    /// retried on the next interval.
    pub async fn run(&self) -> Result<RefreshStats> {
        loop {
            match self.run_single_pass(Utc::now()).await {
                Ok(stats) => {
                    metrics::record_profile_refresh_run("success");
                    metrics::set_profile_refresh_users(stats.users_succeeded as i64);

                    info!(
                        processed = stats.users_processed,
                        succeeded = stats.users_succeeded,
                        failed = stats.users_failed,
                        batches = stats.batches,
                        duration_ms = stats.total_duration_ms,
                        "Profile refresh pass completed"
                    );

                    if self.config.run_once {
                        return Ok(stats);
                    }
                }
                Err(e) => {
                    metrics::record_profile_refresh_run("error");
                    error!(error = %e, "Profile refresh pass failed");

                    if self.config.run_once {
                        return Err(e);
                    }
                }
            }

            info!(
                interval_secs = self.config.interval_secs,
                "Sleeping until next refresh pass"
            );
            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
    }

    pub async fn run_single_pass(&self, now: DateTime<Utc>) -> Result<RefreshStats> {
        let start_time = Instant::now();
        let mut stats = RefreshStats {
            started_at: Some(now),
            ..Default::default()
        };

        let since = now - ChronoDuration::days(self.config.active_days);
        let batch_size = self.config.batch_size.max(1);
        let mut offset = 0;

        info!(
            batch_size = batch_size,
            active_days = self.config.active_days,
            "Starting profile refresh pass"
        );

        loop {
            let users = self
                .events
                .active_users_since(since, batch_size, offset)
                .await?;
            if users.is_empty() {
                break;
            }

            stats.batches += 1;
            let refreshed = self.updater.batch_update_profiles(&users, now).await;
            stats.users_processed += users.len();
            stats.users_succeeded += refreshed;
            stats.users_failed += users.len() - refreshed;

            if users.len() < batch_size {
                break;
            }
            offset += users.len();
        }

        stats.completed_at = Some(Utc::now());
        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

        Ok(stats)
    }
}
