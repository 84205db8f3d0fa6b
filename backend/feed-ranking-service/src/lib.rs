pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{FeedError, Result};
pub use services::{DiversityLayer, EngagementRecorder, FeedService, ProfileUpdater, RankingLayer};
