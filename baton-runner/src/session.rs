//! Conversation memory shared across runs.
//!
//! A [`Session`] stores the model-visible items of earlier runs. When a run is
//! given a session, stored items are prepended to its input and the run's new
//! items are appended once it completes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use baton_types::RunItem;
use tokio::sync::RwLock;

use crate::error::SessionError;

/// Persistent conversation history.
#[async_trait]
pub trait Session: Send + Sync {
    /// Identifier of this conversation.
    fn session_id(&self) -> &str;

    /// Stored items in order. With a limit, only the most recent `limit` items.
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<RunItem>, SessionError>;

    /// Append items.
    async fn add_items(&self, items: Vec<RunItem>) -> Result<(), SessionError>;

    /// Remove and return the most recent item.
    async fn pop_item(&self) -> Result<Option<RunItem>, SessionError>;

    /// Remove every item.
    async fn clear(&self) -> Result<(), SessionError>;
}

/// In-memory session store backed by a `Vec` behind a `RwLock`.
///
/// Suitable for tests and single-process use where history need not survive
/// restarts.
pub struct MemorySession {
    id: String,
    items: RwLock<Vec<RunItem>>,
}

impl MemorySession {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<RunItem>, SessionError> {
        let items = self.items.read().await;
        let start = match limit {
            Some(n) => items.len().saturating_sub(n),
            None => 0,
        };
        Ok(items[start..].to_vec())
    }

    async fn add_items(&self, items: Vec<RunItem>) -> Result<(), SessionError> {
        self.items.write().await.extend(items);
        Ok(())
    }

    async fn pop_item(&self) -> Result<Option<RunItem>, SessionError> {
        Ok(self.items.write().await.pop())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.items.write().await.clear();
        Ok(())
    }
}

/// Several in-memory sessions keyed by id.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<MemorySession>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `id`, created on first use.
    pub async fn session(&self, id: &str) -> Arc<MemorySession> {
        if let Some(existing) = self.sessions.read().await.get(id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(MemorySession::new(id))),
        )
    }

    /// Drop a session.
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_get_preserves_order() {
        let session = MemorySession::new("s1");
        session
            .add_items(vec![RunItem::user("hi"), RunItem::assistant("hello")])
            .await
            .unwrap();
        session.add_items(vec![RunItem::user("bye")]).await.unwrap();

        let all = session.get_items(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], RunItem::user("bye"));

        let last_two = session.get_items(Some(2)).await.unwrap();
        assert_eq!(last_two, vec![RunItem::assistant("hello"), RunItem::user("bye")]);
        assert_eq!(session.get_items(Some(10)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn pop_and_clear() {
        let session = MemorySession::new("s1");
        assert_eq!(session.pop_item().await.unwrap(), None);
        session
            .add_items(vec![RunItem::user("a"), RunItem::user("b")])
            .await
            .unwrap();
        assert_eq!(session.pop_item().await.unwrap(), Some(RunItem::user("b")));
        session.clear().await.unwrap();
        assert!(session.get_items(None).await.unwrap().is_empty());
        assert_eq!(session.session_id(), "s1");
    }

    #[tokio::test]
    async fn store_isolates_sessions() {
        let store = MemorySessionStore::new();
        let a = store.session("a").await;
        a.add_items(vec![RunItem::user("for a")]).await.unwrap();
        let b = store.session("b").await;
        assert!(b.get_items(None).await.unwrap().is_empty());
        let a_again = store.session("a").await;
        assert_eq!(a_again.get_items(None).await.unwrap().len(), 1);
        assert!(store.remove("a").await);
        assert!(!store.remove("a").await);
    }
}
