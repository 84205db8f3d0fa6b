use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use super::scorer::{score_candidate, sort_by_score_desc, ScoredCandidate, ViewerContext};
use crate::error::{FeedError, Result};
use crate::models::Post;

/// Ranking Layer
///
/// Scores candidates in chunks on the blocking pool against a shared
/// read-only `ViewerContext`, then sorts by score descending. Ties keep the
/// candidate order.
pub struct RankingLayer {
    chunk_size: usize,
}

impl Default for RankingLayer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl RankingLayer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn rank_candidates(
        &self,
        ctx: Arc<ViewerContext>,
        candidates: Vec<Post>,
    ) -> Result<Vec<ScoredCandidate>> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let total = candidates.len();
        let mut chunks: Vec<Vec<Post>> = Vec::with_capacity(total / self.chunk_size + 1);
        let mut rest = candidates;
        while rest.len() > self.chunk_size {
            let tail = rest.split_off(self.chunk_size);
            chunks.push(rest);
            rest = tail;
        }
        chunks.push(rest);

        let tasks = chunks.into_iter().map(|chunk| {
            let ctx = ctx.clone();
            tokio::task::spawn_blocking(move || {
                chunk
                    .into_iter()
                    .map(|post| score_candidate(post, &ctx))
                    .collect::<Vec<_>>()
            })
        });

        let scored_chunks = try_join_all(tasks)
            .await
            .map_err(|e| FeedError::Internal(format!("scoring task failed: {}", e)))?;

        let mut scored: Vec<ScoredCandidate> = scored_chunks.into_iter().flatten().collect();
        sort_by_score_desc(&mut scored);

        debug!(
            viewer_id = %ctx.viewer_id,
            candidate_count = total,
            top_score = scored.first().map(|c| c.score).unwrap_or(0.0),
            "Candidates scored"
        );

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn post(hours_old: i64) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: Utc::now() - Duration::hours(hours_old),
            content: "candidate post content".to_string(),
            media_urls: vec![],
            location: None,
            visibility: Visibility::Public,
            is_active: true,
            like_count: 3,
            comment_count: 1,
            share_count: 0,
        }
    }

    #[tokio::test]
    async fn test_rank_candidates_sorted_across_chunks() {
        let layer = RankingLayer::new(3);
        let ctx = Arc::new(ViewerContext::new(Uuid::new_v4(), Utc::now()));
        let candidates: Vec<Post> = (0..10).rev().map(post).collect();

        let ranked = layer.rank_candidates(ctx, candidates).await.unwrap();

        assert_eq!(ranked.len(), 10);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        // freshest first
        assert!(ranked[0].post.hours_since(Utc::now()) < 1.0);
    }

    #[tokio::test]
    async fn test_rank_empty() {
        let layer = RankingLayer::default();
        let ctx = Arc::new(ViewerContext::new(Uuid::new_v4(), Utc::now()));
        assert!(layer.rank_candidates(ctx, vec![]).await.unwrap().is_empty());
    }
}
