use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Post visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Friends,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Friends => "friends",
            Self::Private => "private",
        }
    }

    /// Parse a stored value; anything unknown is treated as private
    pub fn from_db(value: &str) -> Self {
        match value {
            "public" => Self::Public,
            "friends" => Self::Friends,
            _ => Self::Private,
        }
    }
}

/// Where a post was made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostLocation {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub place: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub location: Option<PostLocation>,
    pub visibility: Visibility,
    pub is_active: bool,
    pub like_count: u32,
    pub comment_count: u32,
    pub share_count: u32,
}

impl Post {
    pub fn has_media(&self) -> bool {
        !self.media_urls.is_empty()
    }

    /// Hours elapsed since creation, never negative
    pub fn hours_since(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.created_at).num_seconds().max(0) as f64) / 3600.0
    }
}

/// Coarse content type used for preference matching and diversity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Media,
    Location,
    LongText,
    ShortText,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Location => "location",
            Self::LongText => "long_text",
            Self::ShortText => "short_text",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engagement event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PostView,
    PostLike,
    PostComment,
    PostShare,
    ProfileView,
    ScrollDepth,
    TimeSpent,
    SessionEnd,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        Self::PostView,
        Self::PostLike,
        Self::PostComment,
        Self::PostShare,
        Self::ProfileView,
        Self::ScrollDepth,
        Self::TimeSpent,
        Self::SessionEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostView => "post_view",
            Self::PostLike => "post_like",
            Self::PostComment => "post_comment",
            Self::PostShare => "post_share",
            Self::ProfileView => "profile_view",
            Self::ScrollDepth => "scroll_depth",
            Self::TimeSpent => "time_spent",
            Self::SessionEnd => "session_end",
        }
    }

    /// Like, comment or share
    pub fn is_interaction(&self) -> bool {
        matches!(self, Self::PostLike | Self::PostComment | Self::PostShare)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// What an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EventTarget {
    Post(Uuid),
    Author(Uuid),
    #[default]
    None,
}

impl EventTarget {
    pub fn post_id(&self) -> Option<Uuid> {
        match self {
            Self::Post(id) => Some(*id),
            _ => None,
        }
    }
}

/// Event payload. Well-known keys are typed, everything else is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Seconds (time_spent, session_end)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_viewed: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_ids_viewed: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_depth: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Append-only engagement log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: EventType,
    #[serde(default)]
    pub target: EventTarget,
    #[serde(default)]
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}

impl EngagementEvent {
    pub fn new(
        user_id: Uuid,
        event_type: EventType,
        target: EventTarget,
        payload: EventPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_type,
            target,
            payload,
            created_at,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

impl<T: Clone> PagedResult<T> {
    /// Slice `all` into the requested page; `total` is the full length
    pub fn from_slice(all: &[T], page: u32, per_page: u32) -> Self {
        let offset = (page.saturating_sub(1) as usize).saturating_mul(per_page as usize);
        let items = all
            .iter()
            .skip(offset)
            .take(per_page as usize)
            .cloned()
            .collect();
        Self {
            items,
            total: all.len(),
            page,
            per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        assert_eq!(
            "post_bookmark".parse::<EventType>(),
            Err(UnknownEventType("post_bookmark".to_string()))
        );
    }

    #[test]
    fn test_payload_keeps_unknown_keys() {
        let json = r#"{"duration": 12.5, "content_type": "media", "device": "ios"}"#;
        let payload: EventPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.duration, Some(12.5));
        assert_eq!(payload.content_type, Some(ContentType::Media));
        assert_eq!(payload.extra.get("device"), Some(&serde_json::json!("ios")));
    }

    #[test]
    fn test_paged_result_slicing() {
        let all: Vec<u32> = (1..=25).collect();

        let second = PagedResult::from_slice(&all, 2, 10);
        assert_eq!(second.items, (11..=20).collect::<Vec<_>>());
        assert_eq!(second.total, 25);

        let last = PagedResult::from_slice(&all, 3, 10);
        assert_eq!(last.items, vec![21, 22, 23, 24, 25]);

        let past_end = PagedResult::from_slice(&all, 4, 10);
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 25);
    }

    #[test]
    fn test_hours_since_never_negative() {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: now + chrono::Duration::minutes(5),
            content: "clock skew".to_string(),
            media_urls: vec![],
            location: None,
            visibility: Visibility::Public,
            is_active: true,
            like_count: 0,
            comment_count: 0,
            share_count: 0,
        };
        assert_eq!(post.hours_since(now), 0.0);
    }
}
