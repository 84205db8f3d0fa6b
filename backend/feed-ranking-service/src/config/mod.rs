use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("ranking config: {0}")]
    Ranking(#[from] envy::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub ranking: RankingConfig,
    pub profile_job: ProfileJobConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Ranking knobs, read from `RANKING_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    /// Candidate eligibility window
    #[serde(default = "default_candidate_window_hours")]
    pub candidate_window_hours: i64,
    /// Events needed in the history window before personalizing
    #[serde(default = "default_min_events")]
    pub min_events_for_personalization: u64,
    #[serde(default = "default_history_window_days")]
    pub history_window_days: i64,
    /// Posts fetched for the reverse-chronological fallback
    #[serde(default = "default_fallback_pool_size")]
    pub fallback_pool_size: usize,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
    /// 0 disables feed page memoization
    #[serde(default = "default_feed_cache_ttl_secs")]
    pub feed_cache_ttl_secs: u64,
    #[serde(default = "default_profile_cache_ttl_secs")]
    pub profile_cache_ttl_secs: u64,
    #[serde(default = "default_retention_cache_ttl_secs")]
    pub retention_cache_ttl_secs: u64,
    /// Candidates per scoring task
    #[serde(default = "default_scoring_chunk_size")]
    pub scoring_chunk_size: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            candidate_window_hours: default_candidate_window_hours(),
            min_events_for_personalization: default_min_events(),
            history_window_days: default_history_window_days(),
            fallback_pool_size: default_fallback_pool_size(),
            max_per_page: default_max_per_page(),
            feed_cache_ttl_secs: default_feed_cache_ttl_secs(),
            profile_cache_ttl_secs: default_profile_cache_ttl_secs(),
            retention_cache_ttl_secs: default_retention_cache_ttl_secs(),
            scoring_chunk_size: default_scoring_chunk_size(),
        }
    }
}

impl RankingConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("RANKING_").from_env::<RankingConfig>()
    }
}

#[derive(Debug, Clone)]
pub struct ProfileJobConfig {
    pub batch_size: usize,
    pub interval_secs: u64,
    /// Users with events in this many days get refreshed
    pub active_days: i64,
    pub run_once: bool,
}

impl Default for ProfileJobConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval_secs: 3600,
            active_days: 7,
            run_once: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = ProfileJobConfig::default();

        Ok(Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "feed-ranking-service".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            ranking: RankingConfig::from_env()?,
            profile_job: ProfileJobConfig {
                batch_size: parse_var("PROFILE_REFRESH_BATCH_SIZE", defaults.batch_size)?,
                interval_secs: parse_var("PROFILE_REFRESH_INTERVAL_SECS", defaults.interval_secs)?,
                active_days: parse_var("PROFILE_REFRESH_ACTIVE_DAYS", defaults.active_days)?,
                run_once: parse_var("PROFILE_REFRESH_RUN_ONCE", defaults.run_once)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn default_candidate_window_hours() -> i64 {
    7 * 24
}

fn default_min_events() -> u64 {
    10
}

fn default_history_window_days() -> i64 {
    30
}

fn default_fallback_pool_size() -> usize {
    500
}

fn default_max_per_page() -> u32 {
    100
}

fn default_feed_cache_ttl_secs() -> u64 {
    300
}

fn default_profile_cache_ttl_secs() -> u64 {
    3600
}

fn default_retention_cache_ttl_secs() -> u64 {
    1800
}

fn default_scoring_chunk_size() -> usize {
    64
}
