pub mod content_classifier;
pub mod diversity;
pub mod engagement;
pub mod fallback_ranking;
pub mod feed;
pub mod profile_builder;
pub mod ranking;

pub use diversity::DiversityLayer;
pub use engagement::EngagementRecorder;
pub use feed::{FeedPath, FeedService, FeedSurface};
pub use profile_builder::ProfileUpdater;
pub use ranking::RankingLayer;
