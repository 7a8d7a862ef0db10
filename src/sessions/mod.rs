// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authorization code and login session store
//!
//! Short-lived artifacts of the authorization pipeline live here:
//! authorization codes waiting to be exchanged, refresh tokens, and the
//! single-use login session that bridges `/login` back into `/authorize`.
//!
//! Two backends implement the same [`CodeStore`] contract: an in-process
//! map with a periodic sweep, and Redis for deployments with several
//! replicas. The pipeline never cares which one is active.
//!
//! # Invariants
//!
//! - `(kind, code)` is unique in the store at any moment; `put` fails with
//!   [`CodeStoreError::CodeTaken`] on collision.
//! - Expiry is monotone: once a session has passed `created_at + ttl` it
//!   can never become visible again.
//! - `push`/`pull` of login sessions is exactly-once.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::signing::TokenPayload;

pub use memory::MemoryCodeStore;
pub use redis::RedisCodeStore;

/// Alphabet of generated codes: the URL-unreserved characters.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Length of generated codes.
const CODE_LENGTH: usize = 43;

/// Generate a random opaque code from the unreserved alphabet.
pub fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// The two kinds of stored authorization sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Authorization code waiting for the token exchange.
    Code,
    /// Refresh token.
    Refresh,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Code => write!(f, "code"),
            SessionKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// PKCE challenge methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    /// No challenge attached.
    #[default]
    #[serde(rename = "none")]
    None,
    /// Verifier equals the challenge literally.
    #[serde(rename = "plain")]
    Plain,
    /// Challenge is the base64url SHA-256 of the verifier, unpadded.
    #[serde(rename = "S256")]
    S256,
}

impl PkceMethod {
    /// Parse a `code_challenge_method` query value.
    ///
    /// Absent means [`PkceMethod::None`]; anything unrecognized is an
    /// error the caller reports as a bad request.
    pub fn parse(value: Option<&str>) -> Result<Self, String> {
        match value {
            None | Some("") | Some("none") => Ok(PkceMethod::None),
            Some("plain") => Ok(PkceMethod::Plain),
            Some("S256") => Ok(PkceMethod::S256),
            Some(other) => Err(other.to_string()),
        }
    }
}

/// A random token paired with its PKCE binding.
///
/// Equality compares the value together with the challenge method and
/// content, so two stored codes with the same random value but different
/// bindings never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    /// The opaque random value.
    pub value: String,
    /// Challenge method bound at authorization time.
    pub method: PkceMethod,
    /// The challenge itself, when a method is set.
    pub challenge: Option<String>,
}

impl Code {
    /// Mint a fresh random code with the given binding.
    pub fn random(method: PkceMethod, challenge: Option<String>) -> Self {
        Self {
            value: random_code(),
            method,
            challenge,
        }
    }

    /// Check a presented `code_verifier` against the binding.
    ///
    /// - `none`: no verifier expected, any presented verifier is ignored
    /// - `plain`: the verifier must equal the challenge literally
    /// - `S256`: base64url(SHA-256(verifier)) without padding must equal
    ///   the challenge
    pub fn verify(&self, verifier: Option<&str>) -> bool {
        match self.method {
            PkceMethod::None => true,
            PkceMethod::Plain => match (verifier, &self.challenge) {
                (Some(v), Some(c)) => v == c,
                _ => false,
            },
            PkceMethod::S256 => match (verifier, &self.challenge) {
                (Some(v), Some(c)) => {
                    let digest = Sha256::digest(v.as_bytes());
                    URL_SAFE_NO_PAD.encode(digest) == *c
                }
                _ => false,
            },
        }
    }
}

/// Record of an in-flight or completed authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Whether this is an authorization code or a refresh token.
    pub kind: SessionKind,

    /// The opaque code value handed to the client.
    pub code: String,

    /// Client-provided state echoed back on the redirect.
    pub state: String,

    /// Final granted scope set.
    pub scopes: Vec<String>,

    /// Claims to be minted into the access token at exchange time.
    pub payload: TokenPayload,

    /// Validated absolute redirect target.
    pub redirect: String,

    /// PKCE challenge method bound at authorization time.
    #[serde(default)]
    pub pkce_method: PkceMethod,

    /// PKCE challenge, when a method is set.
    #[serde(default)]
    pub pkce_challenge: Option<String>,

    /// Lifetime in seconds, strictly positive.
    pub ttl_seconds: i64,

    /// Creation timestamp; the session is unreachable after
    /// `created_at + ttl_seconds`.
    pub created_at: DateTime<Utc>,
}

impl AuthSession {
    /// The code with its PKCE binding.
    pub fn pkce_code(&self) -> Code {
        Code {
            value: self.code.clone(),
            method: self.pkce_method,
            challenge: self.pkce_challenge.clone(),
        }
    }

    /// Whether the session has passed its TTL at the given instant.
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.created_at + chrono::Duration::seconds(self.ttl_seconds) < now
    }

    /// Whether the session has passed its TTL now.
    pub fn expired(&self) -> bool {
        self.expired_at(Utc::now())
    }
}

/// Single-use bridge between a successful login and the ensuing
/// authorize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    /// Random handle appended to the post-login redirect.
    pub login_id: Uuid,

    /// Lifetime in seconds. Default 120.
    pub ttl_seconds: i64,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl LoginSession {
    /// Mint a fresh login session.
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            login_id: Uuid::new_v4(),
            ttl_seconds,
            created_at: Utc::now(),
        }
    }

    /// Whether the session has passed its TTL.
    pub fn expired(&self) -> bool {
        self.created_at + chrono::Duration::seconds(self.ttl_seconds) < Utc::now()
    }
}

/// Errors raised by the code store.
#[derive(Debug, thiserror::Error)]
pub enum CodeStoreError {
    /// A session with the same `(kind, code)` already exists.
    #[error("code already taken")]
    CodeTaken,

    /// The backend is unreachable or timed out.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Contract shared by the memory and Redis backends.
///
/// Operations against a single `(kind, value)` key are serialized:
/// put-then-get observes the put, remove-then-get returns nothing.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Store a session. Fails with [`CodeStoreError::CodeTaken`] when the
    /// `(kind, code)` pair already exists.
    async fn put(&self, session: AuthSession) -> Result<(), CodeStoreError>;

    /// Fetch a session, optionally deleting it atomically. Returns `None`
    /// for absent or expired sessions.
    async fn get(&self, kind: SessionKind, value: &str, remove: bool) -> Option<AuthSession>;

    /// Number of live authorization sessions.
    async fn count(&self) -> usize;

    /// Delete a session, if present.
    async fn delete(&self, kind: SessionKind, value: &str);

    /// Revoke every session whose payload matches the tenant and subject.
    /// The scan may run in the background; the call returns promptly.
    async fn wipe(&self, tenant: &str, subject: &str);

    /// Store a login session.
    async fn push(&self, login: LoginSession);

    /// Consume a login session. Returns `true` and removes it iff present
    /// and unexpired; every subsequent pull of the same id returns `false`.
    async fn pull(&self, login_id: &str) -> bool;

    /// Whether the backend is reachable.
    async fn healthy(&self) -> bool;
}
