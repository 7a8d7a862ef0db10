// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Redis session store backend
//!
//! Sessions are stored under `"<kind>~<value>"` keys as JSON, with an
//! EXPIRE equal to the session TTL issued immediately after the SET, so
//! Redis enforces the monotone-expiry invariant on its own. Login
//! sessions live under `"login~<uuid>"` and are consumed with GETDEL.
//!
//! `wipe` scans the keyspace and deletes matching sessions on a spawned
//! background task so the calling handler does not block on the scan.

use async_trait::async_trait;
use log::{debug, error, warn};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{AuthSession, CodeStore, CodeStoreError, LoginSession, SessionKind};

/// Key prefix of login sessions.
const LOGIN_PREFIX: &str = "login~";

/// Redis backend of the [`CodeStore`] contract.
pub struct RedisCodeStore {
    url: String,
    operation_timeout: Duration,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCodeStore {
    /// Create a store against a `redis://` URL.
    ///
    /// The connection is established lazily on first use and re-established
    /// after failures.
    pub fn new(url: impl Into<String>, operation_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            operation_timeout,
            connection: Mutex::new(None),
        }
    }

    fn session_key(kind: SessionKind, value: &str) -> String {
        format!("{}~{}", kind, value)
    }

    fn login_key(login_id: &str) -> String {
        format!("{}{}", LOGIN_PREFIX, login_id)
    }

    /// Get a working connection, reconnecting when the cached one fails
    /// a PING.
    async fn get_connection(&self) -> Result<MultiplexedConnection, CodeStoreError> {
        let mut slot = self.connection.lock().await;

        if let Some(conn) = slot.as_mut() {
            let ping: Result<String, redis::RedisError> =
                redis::cmd("PING").query_async(conn).await;
            if ping.is_ok() {
                return Ok(conn.clone());
            }
            warn!("Session store connection lost, reconnecting");
            *slot = None;
        }

        let client = redis::Client::open(self.url.clone())
            .map_err(|e| CodeStoreError::Unavailable(e.to_string()))?;
        let conn = timeout(
            self.operation_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| CodeStoreError::Unavailable("connect timeout".into()))?
        .map_err(|e| CodeStoreError::Unavailable(e.to_string()))?;

        *slot = Some(conn.clone());
        debug!("Session store connected to Redis");
        Ok(conn)
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, CodeStoreError>
    where
        F: std::future::Future<Output = Result<T, redis::RedisError>>,
    {
        timeout(self.operation_timeout, operation)
            .await
            .map_err(|_| CodeStoreError::Unavailable("operation timeout".into()))?
            .map_err(|e| CodeStoreError::Unavailable(e.to_string()))
    }

    /// Collect all session keys of both kinds.
    async fn session_keys(
        conn: &mut MultiplexedConnection,
    ) -> Result<Vec<String>, redis::RedisError> {
        let mut keys = Vec::new();
        for prefix in ["code~*", "refresh~*"] {
            let mut iter = conn.scan_match::<_, String>(prefix).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn put(&self, session: AuthSession) -> Result<(), CodeStoreError> {
        let mut conn = self.get_connection().await?;
        let key = Self::session_key(session.kind, &session.code);
        let body = serde_json::to_string(&session)
            .map_err(|e| CodeStoreError::Unavailable(e.to_string()))?;
        let ttl = session.ttl_seconds.max(1);

        let outcome: Option<String> = self
            .run(async {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(&body)
                    .arg("NX")
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        if outcome.is_none() {
            return Err(CodeStoreError::CodeTaken);
        }

        self.run(async {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(ttl)
                .query_async::<()>(&mut conn)
                .await
        })
        .await?;
        Ok(())
    }

    async fn get(&self, kind: SessionKind, value: &str, remove: bool) -> Option<AuthSession> {
        let mut conn = self.get_connection().await.ok()?;
        let key = Self::session_key(kind, value);
        let body: Option<String> = if remove {
            self.run(async {
                redis::cmd("GETDEL")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
            })
            .await
            .ok()?
        } else {
            self.run(conn.get(&key)).await.ok()?
        };
        let session: AuthSession = serde_json::from_str(&body?).ok()?;
        // Redis removes expired keys on its own; this guards against
        // clock drift between writer and reader
        if session.expired() {
            return None;
        }
        Some(session)
    }

    async fn count(&self) -> usize {
        let Ok(mut conn) = self.get_connection().await else {
            return 0;
        };
        match self.run(Self::session_keys(&mut conn)).await {
            Ok(keys) => keys.len(),
            Err(_) => 0,
        }
    }

    async fn delete(&self, kind: SessionKind, value: &str) {
        if let Ok(mut conn) = self.get_connection().await {
            let key = Self::session_key(kind, value);
            let _ = self.run(conn.del::<_, ()>(&key)).await;
        }
    }

    async fn wipe(&self, tenant: &str, subject: &str) {
        let Ok(conn) = self.get_connection().await else {
            return;
        };
        let tenant = tenant.to_string();
        let subject = subject.to_string();

        // The SCAN walks the whole session keyspace; run it detached so
        // the logout handler answers promptly
        tokio::spawn(async move {
            let mut conn = conn;
            let keys = match Self::session_keys(&mut conn).await {
                Ok(keys) => keys,
                Err(err) => {
                    error!("Session wipe scan failed: {}", err);
                    return;
                }
            };
            let mut wiped = 0usize;
            for key in keys {
                let body: Option<String> = match conn.get(&key).await {
                    Ok(body) => body,
                    Err(_) => continue,
                };
                let Some(body) = body else { continue };
                let Ok(session) = serde_json::from_str::<AuthSession>(&body) else {
                    continue;
                };
                if session.payload.tenant == tenant && session.payload.sub == subject {
                    if conn.del::<_, ()>(&key).await.is_ok() {
                        wiped += 1;
                    }
                }
            }
            debug!("Wiped {} sessions of {}/{}", wiped, tenant, subject);
        });
    }

    async fn push(&self, login: LoginSession) {
        let Ok(mut conn) = self.get_connection().await else {
            return;
        };
        let key = Self::login_key(&login.login_id.to_string());
        let Ok(body) = serde_json::to_string(&login) else {
            return;
        };
        let ttl = login.ttl_seconds.max(1) as u64;
        if let Err(err) = self.run(conn.set_ex::<_, _, ()>(&key, body, ttl)).await {
            error!("Failed to store login session: {}", err);
        }
    }

    async fn pull(&self, login_id: &str) -> bool {
        let Ok(mut conn) = self.get_connection().await else {
            return false;
        };
        let key = Self::login_key(login_id);
        let body: Result<Option<String>, _> = self
            .run(async {
                redis::cmd("GETDEL")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
            })
            .await;
        match body {
            Ok(Some(body)) => serde_json::from_str::<LoginSession>(&body)
                .map(|login| !login.expired())
                .unwrap_or(false),
            _ => false,
        }
    }

    async fn healthy(&self) -> bool {
        match self.get_connection().await {
            Ok(mut conn) => {
                let ping: Result<String, CodeStoreError> = self
                    .run(async { redis::cmd("PING").query_async(&mut conn).await })
                    .await;
                ping.is_ok()
            }
            Err(_) => false,
        }
    }
}
