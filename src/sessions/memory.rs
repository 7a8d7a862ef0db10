// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-process session store backend
//!
//! A mutex-guarded map keyed by `(kind, value)`. Expired entries are
//! removed lazily inside `get` and in bulk by [`MemoryCodeStore::sweep_expired`],
//! which the daemon invokes on a fixed cadence (default every 5 seconds).

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{AuthSession, CodeStore, CodeStoreError, LoginSession, SessionKind};

/// Memory backend of the [`CodeStore`] contract.
#[derive(Default)]
pub struct MemoryCodeStore {
    sessions: Mutex<HashMap<(SessionKind, String), AuthSession>>,
    logins: Mutex<HashMap<String, LoginSession>>,
}

impl MemoryCodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired session and login handle.
    ///
    /// # Returns
    ///
    /// Number of removed entries.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;

        {
            let mut sessions = self.sessions.lock().unwrap();
            let before = sessions.len();
            sessions.retain(|_, session| !session.expired_at(now));
            removed += before - sessions.len();
        }
        {
            let mut logins = self.logins.lock().unwrap();
            let before = logins.len();
            logins.retain(|_, login| !login.expired());
            removed += before - logins.len();
        }

        if removed > 0 {
            debug!("Swept {} expired sessions", removed);
        }
        removed
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn put(&self, session: AuthSession) -> Result<(), CodeStoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        let key = (session.kind, session.code.clone());
        if let Some(existing) = sessions.get(&key) {
            // An expired leftover does not block the slot
            if !existing.expired() {
                return Err(CodeStoreError::CodeTaken);
            }
        }
        sessions.insert(key, session);
        Ok(())
    }

    async fn get(&self, kind: SessionKind, value: &str, remove: bool) -> Option<AuthSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let key = (kind, value.to_string());
        let session = sessions.get(&key)?.clone();
        if session.expired() {
            sessions.remove(&key);
            return None;
        }
        if remove {
            sessions.remove(&key);
        }
        Some(session)
    }

    async fn count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    async fn delete(&self, kind: SessionKind, value: &str) {
        self.sessions
            .lock()
            .unwrap()
            .remove(&(kind, value.to_string()));
    }

    async fn wipe(&self, tenant: &str, subject: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions
            .retain(|_, s| !(s.payload.tenant == tenant && s.payload.sub == subject));
        debug!(
            "Wiped {} sessions of {}/{}",
            before - sessions.len(),
            tenant,
            subject
        );
    }

    async fn push(&self, login: LoginSession) {
        self.logins
            .lock()
            .unwrap()
            .insert(login.login_id.to_string(), login);
    }

    async fn pull(&self, login_id: &str) -> bool {
        match self.logins.lock().unwrap().remove(login_id) {
            Some(login) => !login.expired(),
            None => false,
        }
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::PkceMethod;
    use crate::signing::TokenPayload;
    use chrono::Duration;

    fn session(kind: SessionKind, code: &str, ttl: i64) -> AuthSession {
        AuthSession {
            kind,
            code: code.to_string(),
            state: "xyz".into(),
            scopes: vec!["read".into()],
            payload: TokenPayload::new("alice", "acme", Duration::hours(1)),
            redirect: "https://app.example.com/cb".into(),
            pkce_method: PkceMethod::None,
            pkce_challenge: None,
            ttl_seconds: ttl,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_observes_put() {
        let store = MemoryCodeStore::new();
        store.put(session(SessionKind::Code, "abc", 60)).await.unwrap();
        let found = store.get(SessionKind::Code, "abc", false).await.unwrap();
        assert_eq!(found.code, "abc");
        // Still there, remove=false
        assert!(store.get(SessionKind::Code, "abc", false).await.is_some());
    }

    #[tokio::test]
    async fn get_with_remove_consumes_the_session() {
        let store = MemoryCodeStore::new();
        store.put(session(SessionKind::Code, "abc", 60)).await.unwrap();
        assert!(store.get(SessionKind::Code, "abc", true).await.is_some());
        assert!(store.get(SessionKind::Code, "abc", false).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected() {
        let store = MemoryCodeStore::new();
        store.put(session(SessionKind::Code, "abc", 60)).await.unwrap();
        let err = store.put(session(SessionKind::Code, "abc", 60)).await;
        assert!(matches!(err, Err(CodeStoreError::CodeTaken)));
        // Same value under another kind is a different key
        store
            .put(session(SessionKind::Refresh, "abc", 60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_sessions_are_unreachable() {
        let store = MemoryCodeStore::new();
        let mut expired = session(SessionKind::Code, "old", 10);
        expired.created_at = Utc::now() - Duration::seconds(11);
        store.put(expired).await.unwrap();
        assert!(store.get(SessionKind::Code, "old", false).await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries() {
        let store = MemoryCodeStore::new();
        let mut expired = session(SessionKind::Code, "old", 10);
        expired.created_at = Utc::now() - Duration::seconds(11);
        store.put(expired).await.unwrap();
        store.put(session(SessionKind::Code, "new", 60)).await.unwrap();
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn login_sessions_pull_exactly_once() {
        let store = MemoryCodeStore::new();
        let login = LoginSession::new(120);
        let id = login.login_id.to_string();
        store.push(login).await;
        assert!(store.pull(&id).await);
        assert!(!store.pull(&id).await);
    }

    #[tokio::test]
    async fn wipe_revokes_matching_sessions_only() {
        let store = MemoryCodeStore::new();
        store.put(session(SessionKind::Code, "a", 60)).await.unwrap();
        let mut other = session(SessionKind::Refresh, "b", 60);
        other.payload.sub = "bob".into();
        store.put(other).await.unwrap();
        store.wipe("acme", "alice").await;
        assert!(store.get(SessionKind::Code, "a", false).await.is_none());
        assert!(store.get(SessionKind::Refresh, "b", false).await.is_some());
    }
}
