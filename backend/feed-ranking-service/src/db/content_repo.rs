/// Content Store backed by Postgres
///
/// Read-only view over posts and the social graph.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::error;
use uuid::Uuid;

use super::ContentStore;
use crate::error::{FeedError, Result};
use crate::models::{Post, PostLocation, Visibility};

const POST_COLUMNS: &str = r#"
    p.id, p.author_id, p.created_at, p.content, p.media_urls,
    p.location_lat, p.location_lng, p.location_place,
    p.visibility, p.is_active, p.like_count, p.comment_count, p.share_count
"#;

pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn id_set(&self, sql: &str, user: Uuid, what: &str) -> Result<HashSet<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(sql)
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(what, e))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

fn db_error(what: &str, e: sqlx::Error) -> FeedError {
    error!(error = %e, "Failed to load {}", what);
    FeedError::Database(e)
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn candidate_posts(
        &self,
        viewer: Uuid,
        since: DateTime<Utc>,
        excluded_authors: &[Uuid],
    ) -> Result<Vec<Post>> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p
            WHERE p.is_active = TRUE
                AND p.created_at >= $2
                AND p.author_id <> $1
                AND NOT (p.author_id = ANY($3))
                AND (
                    p.visibility = 'public'
                    OR (p.visibility = 'friends' AND EXISTS (
                        SELECT 1 FROM friendships f
                        WHERE f.user_id = $1 AND f.friend_id = p.author_id
                            AND f.status = 'accepted'
                    ))
                )
            "#
        );

        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(viewer)
            .bind(since)
            .bind(excluded_authors)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("candidate posts", e))?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn followed_posts(&self, viewer: Uuid) -> Result<Vec<Post>> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p
            LEFT JOIN friendships f
                ON f.user_id = $1 AND f.friend_id = p.author_id AND f.status = 'accepted'
            WHERE p.is_active = TRUE
                AND (
                    f.friend_id IS NOT NULL
                    OR EXISTS (
                        SELECT 1 FROM follows fo
                        WHERE fo.follower_id = $1 AND fo.followee_id = p.author_id
                    )
                )
                AND (
                    p.visibility = 'public'
                    OR (p.visibility = 'friends' AND f.friend_id IS NOT NULL)
                )
            "#
        );

        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(viewer)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("followed posts", e))?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn recent_public_posts(&self, exclude_author: Uuid, limit: usize) -> Result<Vec<Post>> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p
            WHERE p.is_active = TRUE
                AND p.visibility = 'public'
                AND p.author_id <> $1
            ORDER BY p.created_at DESC
            LIMIT $2
            "#
        );

        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(exclude_author)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("recent public posts", e))?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn following_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>> {
        self.id_set(
            "SELECT followee_id FROM follows WHERE follower_id = $1",
            viewer,
            "following ids",
        )
        .await
    }

    async fn friend_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>> {
        self.id_set(
            "SELECT friend_id FROM friendships WHERE user_id = $1 AND status = 'accepted'",
            viewer,
            "friend ids",
        )
        .await
    }

    async fn blocked_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>> {
        self.id_set(
            "SELECT blocked_id FROM blocks WHERE blocker_id = $1",
            viewer,
            "blocked ids",
        )
        .await
    }

    async fn mutual_friend_count(&self, viewer: Uuid, other: Uuid) -> Result<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM friendships a
            JOIN friendships b ON a.friend_id = b.friend_id
            WHERE a.user_id = $1 AND a.status = 'accepted'
                AND b.user_id = $2 AND b.status = 'accepted'
            "#,
        )
        .bind(viewer)
        .bind(other)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("mutual friend count", e))?;

        Ok(count.max(0) as u32)
    }

    async fn author_post_count_since(&self, author: Uuid, since: DateTime<Utc>) -> Result<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM posts WHERE author_id = $1 AND created_at >= $2",
        )
        .bind(author)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("author post count", e))?;

        Ok(count.max(0) as u32)
    }

    async fn last_active_at(&self, user: Uuid) -> Result<Option<DateTime<Utc>>> {
        let last = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT last_active_at FROM users WHERE id = $1",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("last active timestamp", e))?;

        Ok(last.flatten())
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    created_at: DateTime<Utc>,
    content: String,
    media_urls: Option<Vec<String>>,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    location_place: Option<String>,
    visibility: String,
    is_active: bool,
    like_count: i32,
    comment_count: i32,
    share_count: i32,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        let location = if row.location_lat.is_some()
            || row.location_lng.is_some()
            || row.location_place.is_some()
        {
            Some(PostLocation {
                latitude: row.location_lat,
                longitude: row.location_lng,
                place: row.location_place,
            })
        } else {
            None
        };

        Post {
            id: row.id,
            author_id: row.author_id,
            created_at: row.created_at,
            content: row.content,
            media_urls: row.media_urls.unwrap_or_default(),
            location,
            visibility: Visibility::from_db(&row.visibility),
            is_active: row.is_active,
            like_count: row.like_count.max(0) as u32,
            comment_count: row.comment_count.max(0) as u32,
            share_count: row.share_count.max(0) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> PostRow {
        PostRow {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: Utc::now(),
            content: "row".to_string(),
            media_urls: None,
            location_lat: None,
            location_lng: None,
            location_place: None,
            visibility: "friends".to_string(),
            is_active: true,
            like_count: -1,
            comment_count: 2,
            share_count: 0,
        }
    }

    #[test]
    fn test_row_without_location_columns() {
        let post = Post::from(row());
        assert!(post.location.is_none());
        assert!(post.media_urls.is_empty());
        assert_eq!(post.visibility, Visibility::Friends);
        assert_eq!(post.like_count, 0);
    }

    #[test]
    fn test_row_with_place_only() {
        let mut r = row();
        r.location_place = Some("Lisbon".to_string());
        let post = Post::from(r);
        assert_eq!(
            post.location.and_then(|l| l.place),
            Some("Lisbon".to_string())
        );
    }
}
