//! In-memory login sessions keyed by bearer token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

/// An authenticated user plus the LLM key they signed in with.
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub api_key: String,
    created_at: Instant,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Start a session and return its token.
    pub async fn create(&self, email: &str, api_key: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let session = Session {
            email: email.to_string(),
            api_key: api_key.to_string(),
            created_at: Instant::now(),
        };
        let mut sessions = self.inner.write().await;
        sessions.retain(|_, s| s.created_at.elapsed() < self.ttl);
        sessions.insert(token.clone(), session);
        token
    }

    /// Look up a live session. Expired sessions are dropped on access.
    pub async fn get(&self, token: &str) -> Option<Session> {
        {
            let sessions = self.inner.read().await;
            match sessions.get(token) {
                Some(s) if s.created_at.elapsed() < self.ttl => return Some(s.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.inner.write().await.remove(token);
        None
    }

    /// End a session. Returns `false` if the token was unknown.
    pub async fn remove(&self, token: &str) -> bool {
        self.inner.write().await.remove(token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_remove() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create("ana@example.com", "gsk_test_key").await;
        let session = store.get(&token).await.unwrap();
        assert_eq!(session.email, "ana@example.com");
        assert_eq!(session.api_key, "gsk_test_key");

        assert!(store.remove(&token).await);
        assert!(store.get(&token).await.is_none());
        assert!(!store.remove(&token).await);
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.create("a@example.com", "k").await;
        let b = store.create("a@example.com", "k").await;
        assert_ne!(a, b);
        assert!(store.get(&a).await.is_some());
        assert!(store.get(&b).await.is_some());
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::ZERO);
        let token = store.create("a@example.com", "k").await;
        assert!(store.get(&token).await.is_none());
        assert!(store.inner.read().await.is_empty());
    }
}
