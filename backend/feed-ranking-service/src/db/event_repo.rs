/// Engagement event log backed by Postgres
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use super::EventLog;
use crate::error::{FeedError, Result};
use crate::models::{EngagementEvent, EventPayload, EventTarget, EventType};

pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn target_columns(target: &EventTarget) -> (Option<&'static str>, Option<Uuid>) {
    match target {
        EventTarget::Post(id) => (Some("post"), Some(*id)),
        EventTarget::Author(id) => (Some("author"), Some(*id)),
        EventTarget::None => (None, None),
    }
}

const INSERT_EVENT: &str = r#"
    INSERT INTO engagement_events
        (id, user_id, event_type, target_kind, target_id, payload, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(&self, event: &EngagementEvent) -> Result<()> {
        let (kind, target_id) = target_columns(&event.target);
        let payload = serde_json::to_value(&event.payload)?;

        sqlx::query(INSERT_EVENT)
            .bind(event.id)
            .bind(event.user_id)
            .bind(event.event_type.as_str())
            .bind(kind)
            .bind(target_id)
            .bind(payload)
            .bind(event.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(user_id = %event.user_id, event_type = %event.event_type, "Failed to append event: {}", e);
                FeedError::Database(e)
            })?;

        Ok(())
    }

    async fn append_bulk(&self, events: &[EngagementEvent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for event in events {
            let (kind, target_id) = target_columns(&event.target);
            let payload = serde_json::to_value(&event.payload)?;

            sqlx::query(INSERT_EVENT)
                .bind(event.id)
                .bind(event.user_id)
                .bind(event.event_type.as_str())
                .bind(kind)
                .bind(target_id)
                .bind(payload)
                .bind(event.created_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await.map_err(|e| {
            error!(count = events.len(), "Failed to commit event batch: {}", e);
            FeedError::Database(e)
        })?;

        Ok(())
    }

    async fn events_since(&self, user: Uuid, since: DateTime<Utc>) -> Result<Vec<EngagementEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, user_id, event_type, target_kind, target_id, payload, created_at
            FROM engagement_events
            WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(user)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(user_id = %user, "Failed to load events: {}", e);
            FeedError::Database(e)
        })?;

        Ok(rows.into_iter().filter_map(EventRow::into_event).collect())
    }

    async fn count_since(&self, user: Uuid, since: DateTime<Utc>) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM engagement_events WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn active_users_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Uuid>> {
        let users = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT user_id
            FROM engagement_events
            WHERE created_at >= $1
            ORDER BY user_id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    user_id: Uuid,
    event_type: String,
    target_kind: Option<String>,
    target_id: Option<Uuid>,
    payload: Option<Value>,
    created_at: DateTime<Utc>,
}

impl EventRow {
    /// Rows with an unknown event type are skipped
    fn into_event(self) -> Option<EngagementEvent> {
        let event_type = match self.event_type.parse::<EventType>() {
            Ok(t) => t,
            Err(e) => {
                warn!(event_id = %self.id, "Skipping stored event: {}", e);
                return None;
            }
        };

        let target = match (self.target_kind.as_deref(), self.target_id) {
            (Some("post"), Some(id)) => EventTarget::Post(id),
            (Some("author"), Some(id)) => EventTarget::Author(id),
            _ => EventTarget::None,
        };

        let payload = self
            .payload
            .map(|value| decode_payload(self.id, value))
            .unwrap_or_default();

        Some(EngagementEvent {
            id: self.id,
            user_id: self.user_id,
            event_type,
            target,
            payload,
            created_at: self.created_at,
        })
    }
}

/// Decode a stored payload key by key. A well-known key that fails to parse
/// is dropped on its own; the other keys survive.
fn decode_payload(event_id: Uuid, value: Value) -> EventPayload {
    let Value::Object(map) = value else {
        warn!(event_id = %event_id, "Stored payload is not an object, ignoring");
        return EventPayload::default();
    };

    let mut payload = EventPayload::default();
    for (key, value) in map {
        match key.as_str() {
            "duration" => payload.duration = payload_field(event_id, &key, value),
            "content_type" => payload.content_type = payload_field(event_id, &key, value),
            "author_id" => payload.author_id = payload_field(event_id, &key, value),
            "posts_viewed" => payload.posts_viewed = payload_field(event_id, &key, value),
            "post_ids_viewed" => {
                payload.post_ids_viewed = payload_field(event_id, &key, value).unwrap_or_default()
            }
            "interactions" => payload.interactions = payload_field(event_id, &key, value),
            "scroll_depth" => payload.scroll_depth = payload_field(event_id, &key, value),
            _ => {
                payload.extra.insert(key, value);
            }
        }
    }
    payload
}

/// `null` reads as absent
fn payload_field<T: DeserializeOwned>(event_id: Uuid, key: &str, value: Value) -> Option<T> {
    match serde_json::from_value::<Option<T>>(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(event_id = %event_id, key = key, error = %e, "Dropping undecodable payload field");
            None
        }
    }
}
