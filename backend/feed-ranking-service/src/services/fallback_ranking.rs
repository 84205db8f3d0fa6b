//! Reverse-chronological fallback feed
//!
//! Served when the viewer's history is too thin to personalize, when there
//! are no eligible candidates, and for the followed feed of a viewer who
//! follows nobody. Public posts only, never the viewer's own, newest first.

use tracing::debug;
use uuid::Uuid;

use crate::models::{Post, Visibility};

/// Filter and order a fallback pool. Ties on `created_at` keep pool order.
pub fn fallback_rank_posts(viewer_id: Uuid, pool: Vec<Post>) -> Vec<Post> {
    let mut posts: Vec<Post> = pool
        .into_iter()
        .filter(|p| p.is_active)
        .filter(|p| p.visibility == Visibility::Public)
        .filter(|p| p.author_id != viewer_id)
        .collect();

    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    debug!(viewer_id = %viewer_id, post_count = posts.len(), "Fallback ranking applied");
    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn post(author: Uuid, visibility: Visibility, minutes_old: i64) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: author,
            created_at: Utc::now() - Duration::minutes(minutes_old),
            content: "fallback".to_string(),
            media_urls: vec![],
            location: None,
            visibility,
            is_active: true,
            like_count: 0,
            comment_count: 0,
            share_count: 0,
        }
    }

    #[test]
    fn test_fallback_newest_first_public_only() {
        let viewer = Uuid::new_v4();
        let other = Uuid::new_v4();
        let pool = vec![
            post(other, Visibility::Public, 30),
            post(viewer, Visibility::Public, 1),
            post(other, Visibility::Friends, 2),
            post(other, Visibility::Public, 5),
            post(other, Visibility::Private, 3),
        ];

        let ranked = fallback_rank_posts(viewer, pool);

        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].created_at > ranked[1].created_at);
        assert!(ranked.iter().all(|p| p.author_id != viewer));
        assert!(ranked.iter().all(|p| p.visibility == Visibility::Public));
    }
}
