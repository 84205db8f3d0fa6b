//! In-process collaborators
//!
//! Deterministic stand-ins for the Content Store and the event log. Both can be
//! switched into an "unavailable" mode to exercise upstream failure paths.

use super::{ContentStore, EventLog};
use crate::error::{FeedError, Result};
use crate::models::{EngagementEvent, Post, Visibility};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

fn lock_poisoned() -> FeedError {
    FeedError::Internal("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
struct Graph {
    /// (follower, followee)
    follows: HashSet<(Uuid, Uuid)>,
    /// Accepted friendships, stored in both directions
    friends: HashSet<(Uuid, Uuid)>,
    /// (blocker, blocked)
    blocks: HashSet<(Uuid, Uuid)>,
    last_active: HashMap<Uuid, DateTime<Utc>>,
}

#[derive(Default)]
pub struct InMemoryContentStore {
    posts: RwLock<Vec<Post>>,
    graph: RwLock<Graph>,
    unavailable: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&self, post: Post) {
        if let Ok(mut posts) = self.posts.write() {
            posts.push(post);
        }
    }

    pub fn follow(&self, follower: Uuid, followee: Uuid) {
        if let Ok(mut graph) = self.graph.write() {
            graph.follows.insert((follower, followee));
        }
    }

    pub fn befriend(&self, a: Uuid, b: Uuid) {
        if let Ok(mut graph) = self.graph.write() {
            graph.friends.insert((a, b));
            graph.friends.insert((b, a));
        }
    }

    pub fn block(&self, blocker: Uuid, blocked: Uuid) {
        if let Ok(mut graph) = self.graph.write() {
            graph.blocks.insert((blocker, blocked));
        }
    }

    pub fn set_last_active(&self, user: Uuid, at: DateTime<Utc>) {
        if let Ok(mut graph) = self.graph.write() {
            graph.last_active.insert(user, at);
        }
    }

    /// Make every subsequent call fail with `FeedError::Upstream`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FeedError::Upstream("content store unavailable".to_string()));
        }
        Ok(())
    }

    fn visible_to(graph: &Graph, viewer: Uuid, post: &Post) -> bool {
        match post.visibility {
            Visibility::Public => true,
            Visibility::Friends => graph.friends.contains(&(viewer, post.author_id)),
            Visibility::Private => false,
        }
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn candidate_posts(
        &self,
        viewer: Uuid,
        since: DateTime<Utc>,
        excluded_authors: &[Uuid],
    ) -> Result<Vec<Post>> {
        self.check_available()?;
        let posts = self.posts.read().map_err(|_| lock_poisoned())?;
        let graph = self.graph.read().map_err(|_| lock_poisoned())?;

        Ok(posts
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| p.created_at >= since)
            .filter(|p| p.author_id != viewer)
            .filter(|p| !excluded_authors.contains(&p.author_id))
            .filter(|p| Self::visible_to(&graph, viewer, p))
            .cloned()
            .collect())
    }

    async fn followed_posts(&self, viewer: Uuid) -> Result<Vec<Post>> {
        self.check_available()?;
        let posts = self.posts.read().map_err(|_| lock_poisoned())?;
        let graph = self.graph.read().map_err(|_| lock_poisoned())?;

        Ok(posts
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| {
                graph.follows.contains(&(viewer, p.author_id))
                    || graph.friends.contains(&(viewer, p.author_id))
            })
            .filter(|p| Self::visible_to(&graph, viewer, p))
            .cloned()
            .collect())
    }

    async fn recent_public_posts(&self, exclude_author: Uuid, limit: usize) -> Result<Vec<Post>> {
        self.check_available()?;
        let posts = self.posts.read().map_err(|_| lock_poisoned())?;

        let mut public: Vec<Post> = posts
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| p.visibility == Visibility::Public)
            .filter(|p| p.author_id != exclude_author)
            .cloned()
            .collect();
        public.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        public.truncate(limit);
        Ok(public)
    }

    async fn following_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>> {
        self.check_available()?;
        let graph = self.graph.read().map_err(|_| lock_poisoned())?;
        Ok(graph
            .follows
            .iter()
            .filter(|(follower, _)| *follower == viewer)
            .map(|(_, followee)| *followee)
            .collect())
    }

    async fn friend_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>> {
        self.check_available()?;
        let graph = self.graph.read().map_err(|_| lock_poisoned())?;
        Ok(graph
            .friends
            .iter()
            .filter(|(a, _)| *a == viewer)
            .map(|(_, b)| *b)
            .collect())
    }

    async fn blocked_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>> {
        self.check_available()?;
        let graph = self.graph.read().map_err(|_| lock_poisoned())?;
        Ok(graph
            .blocks
            .iter()
            .filter(|(blocker, _)| *blocker == viewer)
            .map(|(_, blocked)| *blocked)
            .collect())
    }

    async fn mutual_friend_count(&self, viewer: Uuid, other: Uuid) -> Result<u32> {
        self.check_available()?;
        let graph = self.graph.read().map_err(|_| lock_poisoned())?;
        let count = graph
            .friends
            .iter()
            .filter(|(a, mutual)| {
                *a == viewer && *mutual != other && graph.friends.contains(&(other, *mutual))
            })
            .count();
        Ok(count as u32)
    }

    async fn author_post_count_since(&self, author: Uuid, since: DateTime<Utc>) -> Result<u32> {
        self.check_available()?;
        let posts = self.posts.read().map_err(|_| lock_poisoned())?;
        Ok(posts
            .iter()
            .filter(|p| p.author_id == author && p.created_at >= since)
            .count() as u32)
    }

    async fn last_active_at(&self, user: Uuid) -> Result<Option<DateTime<Utc>>> {
        self.check_available()?;
        let graph = self.graph.read().map_err(|_| lock_poisoned())?;
        Ok(graph.last_active.get(&user).copied())
    }
}

#[derive(Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<EngagementEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `FeedError::Upstream`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of everything appended so far
    pub fn all(&self) -> Vec<EngagementEvent> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FeedError::Upstream("event log unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: &EngagementEvent) -> Result<()> {
        self.check_available()?;
        let mut events = self.events.write().map_err(|_| lock_poisoned())?;
        events.push(event.clone());
        Ok(())
    }

    async fn append_bulk(&self, batch: &[EngagementEvent]) -> Result<()> {
        self.check_available()?;
        let mut events = self.events.write().map_err(|_| lock_poisoned())?;
        events.extend_from_slice(batch);
        Ok(())
    }

    async fn events_since(&self, user: Uuid, since: DateTime<Utc>) -> Result<Vec<EngagementEvent>> {
        self.check_available()?;
        let events = self.events.read().map_err(|_| lock_poisoned())?;
        let mut matching: Vec<EngagementEvent> = events
            .iter()
            .filter(|e| e.user_id == user && e.created_at >= since)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.created_at);
        Ok(matching)
    }

    async fn count_since(&self, user: Uuid, since: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let events = self.events.read().map_err(|_| lock_poisoned())?;
        Ok(events
            .iter()
            .filter(|e| e.user_id == user && e.created_at >= since)
            .count() as u64)
    }

    async fn active_users_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Uuid>> {
        self.check_available()?;
        let events = self.events.read().map_err(|_| lock_poisoned())?;
        let mut users: Vec<Uuid> = events
            .iter()
            .filter(|e| e.created_at >= since)
            .map(|e| e.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        users.sort();
        Ok(users.into_iter().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn post(author: Uuid, visibility: Visibility, age_hours: i64, now: DateTime<Utc>) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: author,
            created_at: now - Duration::hours(age_hours),
            content: "hello world from the store".to_string(),
            media_urls: vec![],
            location: None,
            visibility,
            is_active: true,
            like_count: 0,
            comment_count: 0,
            share_count: 0,
        }
    }

    #[tokio::test]
    async fn test_candidate_visibility_rules() {
        let now = Utc::now();
        let store = InMemoryContentStore::new();
        let viewer = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        store.befriend(viewer, friend);

        store.add_post(post(friend, Visibility::Friends, 1, now));
        store.add_post(post(stranger, Visibility::Friends, 1, now));
        store.add_post(post(stranger, Visibility::Public, 1, now));
        store.add_post(post(stranger, Visibility::Private, 1, now));
        store.add_post(post(viewer, Visibility::Public, 1, now));

        let candidates = store
            .candidate_posts(viewer, now - Duration::days(7), &[])
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|p| p.author_id != viewer));
        assert!(candidates
            .iter()
            .all(|p| p.visibility != Visibility::Private));
    }

    #[tokio::test]
    async fn test_mutual_friend_count() {
        let store = InMemoryContentStore::new();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.befriend(a, c);
        store.befriend(b, c);
        store.befriend(a, d);
        store.befriend(b, d);
        store.befriend(a, b);

        assert_eq!(store.mutual_friend_count(a, b).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_upstream() {
        let store = InMemoryContentStore::new();
        store.set_unavailable(true);
        let err = store.following_ids(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_active_users_pagination() {
        let log = InMemoryEventLog::new();
        let now = Utc::now();
        for _ in 0..5 {
            let event = EngagementEvent::new(
                Uuid::new_v4(),
                crate::models::EventType::PostView,
                Default::default(),
                Default::default(),
                now,
            );
            log.append(&event).await.unwrap();
        }

        let first = log.active_users_since(now - Duration::hours(1), 3, 0).await.unwrap();
        let rest = log.active_users_since(now - Duration::hours(1), 3, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(rest.len(), 2);
        assert!(first.iter().all(|u| !rest.contains(u)));
    }
}
