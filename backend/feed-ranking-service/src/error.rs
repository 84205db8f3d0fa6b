use feed_cache::CacheError;
use thiserror::Error;

use crate::models::UnknownEventType;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Rejected before any store access
    #[error("Validation error: {0}")]
    Validation(String),

    /// Content Store or another collaborator could not be reached
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FeedError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::Upstream(_) | FeedError::Database(_) | FeedError::Cache(_)
        )
    }
}

impl From<UnknownEventType> for FeedError {
    fn from(err: UnknownEventType) -> Self {
        FeedError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FeedError::Upstream("content store timeout".into()).is_retryable());
        assert!(FeedError::Cache(CacheError::InvalidData("x".into())).is_retryable());
        assert!(!FeedError::Validation("page must be >= 1".into()).is_retryable());
        assert!(!FeedError::Internal("join error".into()).is_retryable());
    }

    #[test]
    fn test_unknown_event_type_is_validation() {
        let err: FeedError = UnknownEventType("nope".into()).into();
        assert!(matches!(err, FeedError::Validation(_)));
    }
}
