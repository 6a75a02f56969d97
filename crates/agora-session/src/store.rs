//! Pluggable storage for auth sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use agora_types::AuthSession;

/// Backing store for [`AuthSession`] records.
///
/// The gateway owns no durable state, so the default implementation is an
/// in-process map. The trait exists so a shared cache can replace it without
/// touching resolution logic. Keys are opaque: session ids for pairing-code
/// sessions, raw token strings for bearer sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<AuthSession>;
    async fn insert(&self, key: String, session: AuthSession);
    async fn remove(&self, key: &str) -> Option<AuthSession>;
    /// Drop every session past its expiry, returning how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, AuthSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Option<AuthSession> {
        self.sessions.get(key).map(|entry| entry.clone())
    }

    async fn insert(&self, key: String, session: AuthSession) {
        self.sessions.insert(key, session);
    }

    async fn remove(&self, key: &str) -> Option<AuthSession> {
        self.sessions.remove(key).map(|(_, session)| session)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let keep = !session.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}
