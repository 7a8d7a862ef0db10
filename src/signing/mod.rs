// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JWT signing subsystem
//!
//! This module implements the token signer used by the authorization
//! pipeline. It supports two algorithms:
//!
//! - **HS256** with a process-wide symmetric secret, used for tokens minted
//!   in plain OAuth mode. HS256 tokens carry no `kid`.
//! - **RS256** with a rotating set of RSA-2048 key pairs, used for tokens
//!   minted in interceptor mode. RS256 tokens carry the signing key's `kid`
//!   in their header, and the matching public keys are published on the
//!   JWKS endpoint.
//!
//! # Architecture
//!
//! - [`TokenPayload`]: the claims minted into every access token
//! - [`KeyRing`]: the mutex-guarded RSA key set with rotation and GC
//! - [`Signer`]: sign/verify facade over both algorithms
//!
//! # Failure semantics
//!
//! Signing errors are fatal for the request that triggered them (the
//! handler surfaces a 500). Verification errors are soft: the caller
//! treats the request as anonymous.

pub mod jwks;
pub mod keys;

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use log::debug;
use serde::{Deserialize, Serialize};

pub use keys::{KeyRing, RsaKeyRecord};

/// Claims minted into every access and refresh token.
///
/// The `tenant` claim binds a token to its tenant: a token presented on a
/// host resolving to a different tenant is treated as invalid. The
/// optional `responsibility` claim is a stable digest of the cookie-scope
/// domain, so a token stolen from one interceptor domain cannot be reused
/// on another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPayload {
    /// Subject, the authenticated principal.
    pub sub: String,

    /// Expiration timestamp (Unix seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix seconds).
    pub iat: i64,

    /// Name of the tenant the token was minted for.
    pub tenant: String,

    /// Role decided by the tenant's login provider, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Login name as presented at the form, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Free-form profile object decided by the login provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,

    /// Digest binding the token to its cookie-scope domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsibility: Option<String>,
}

impl TokenPayload {
    /// Create a payload for a subject of a tenant, expiring after the
    /// given lifetime.
    pub fn new(sub: impl Into<String>, tenant: impl Into<String>, valid_for: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.into(),
            exp: (now + valid_for).timestamp(),
            iat: now.timestamp(),
            tenant: tenant.into(),
            role: None,
            user: None,
            profile: None,
            responsibility: None,
        }
    }

    /// Whether the expiry lies in the past.
    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }

    /// Copy of this payload with a fresh validity window.
    pub fn renewed(&self, valid_for: Duration) -> Self {
        let now = Utc::now();
        let mut payload = self.clone();
        payload.iat = now.timestamp();
        payload.exp = (now + valid_for).timestamp();
        payload
    }
}

/// Token purposes distinguished at verification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    /// An access token presented as a bearer or cookie.
    Access,
    /// A refresh token presented at the token endpoint.
    Refresh,
}

/// Errors raised by the signer.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Producing a signature failed. Fatal for the requesting handler.
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// The token did not verify. The caller treats the request as
    /// anonymous.
    #[error("invalid token")]
    InvalidToken,

    /// RSA key material could not be produced or parsed.
    #[error("key handling failed: {0}")]
    Keys(#[from] anyhow::Error),
}

/// Sign/verify facade over the symmetric secret and the rotating RSA set.
pub struct Signer {
    hmac_encoding: EncodingKey,
    hmac_decoding: DecodingKey,
    ring: KeyRing,
}

impl Signer {
    /// Create a signer from the process-wide HS256 secret.
    ///
    /// The RSA key set starts empty; the first RS256 signature (or the
    /// first JWKS request) generates a key pair lazily.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            hmac_encoding: EncodingKey::from_secret(secret),
            hmac_decoding: DecodingKey::from_secret(secret),
            ring: KeyRing::new(),
        }
    }

    /// Access to the RSA key ring (rotation, GC, JWKS export).
    pub fn key_ring(&self) -> &KeyRing {
        &self.ring
    }

    /// Sign a payload with the given algorithm.
    ///
    /// # Returns
    ///
    /// The encoded token and, for RS256, the `kid` of the signing key.
    pub fn sign(
        &self,
        payload: &TokenPayload,
        algorithm: Algorithm,
    ) -> Result<(String, Option<String>), SignerError> {
        match algorithm {
            Algorithm::HS256 => {
                let token = encode(&Header::new(Algorithm::HS256), payload, &self.hmac_encoding)
                    .map_err(SignerError::Signing)?;
                Ok((token, None))
            }
            Algorithm::RS256 => {
                let record = self.ring.active_signing_key()?;
                let mut header = Header::new(Algorithm::RS256);
                header.kid = Some(record.kid.clone());
                let encoding_key = EncodingKey::from_rsa_pem(record.private_pem.as_bytes())
                    .map_err(SignerError::Signing)?;
                let token =
                    encode(&header, payload, &encoding_key).map_err(SignerError::Signing)?;
                Ok((token, Some(record.kid)))
            }
            other => {
                debug!("Unsupported signing algorithm requested: {:?}", other);
                Err(SignerError::InvalidToken)
            }
        }
    }

    /// Verify a token and return its payload.
    ///
    /// The algorithm is taken from the token header. RS256 tokens are
    /// checked against the key named by their `kid`, falling back to every
    /// registered key for tokens minted before `kid` stamping. Expiry is
    /// NOT enforced here: the caller decides how to treat expired-but-
    /// well-signed tokens (the interceptor answers 401, the resolver flags
    /// the context).
    pub fn verify(&self, token: &str, _type: TokenType) -> Result<TokenPayload, SignerError> {
        let header = decode_header(token).map_err(|err| {
            debug!("Token header rejected: {}", err);
            SignerError::InvalidToken
        })?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        match header.alg {
            Algorithm::HS256 => decode::<TokenPayload>(token, &self.hmac_decoding, &validation)
                .map(|data| data.claims)
                .map_err(|err| {
                    debug!("HS256 validation failed: {}", err);
                    SignerError::InvalidToken
                }),
            Algorithm::RS256 => {
                let candidates = match header.kid.as_deref() {
                    Some(kid) => self
                        .ring
                        .key(kid)
                        .map(|record| vec![record])
                        .unwrap_or_default(),
                    None => self.ring.records(),
                };
                for record in candidates {
                    let decoding_key = match DecodingKey::from_rsa_pem(record.public_pem.as_bytes())
                    {
                        Ok(key) => key,
                        Err(err) => {
                            debug!("Skipping unreadable public key {}: {}", record.kid, err);
                            continue;
                        }
                    };
                    if let Ok(data) = decode::<TokenPayload>(token, &decoding_key, &validation) {
                        return Ok(data.claims);
                    }
                }
                Err(SignerError::InvalidToken)
            }
            other => {
                debug!("Token with unsupported algorithm rejected: {:?}", other);
                Err(SignerError::InvalidToken)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TokenPayload {
        TokenPayload::new("alice", "acme", Duration::hours(1))
    }

    #[test]
    fn hs256_roundtrip_carries_no_kid() {
        let signer = Signer::new(b"test-secret-key-for-signing");
        let (token, kid) = signer.sign(&payload(), Algorithm::HS256).unwrap();
        assert!(kid.is_none());
        let decoded = signer.verify(&token, TokenType::Access).unwrap();
        assert_eq!(decoded.sub, "alice");
        assert_eq!(decoded.tenant, "acme");
    }

    #[test]
    fn rs256_roundtrip_carries_kid() {
        let signer = Signer::new(b"test-secret-key-for-signing");
        let (token, kid) = signer.sign(&payload(), Algorithm::RS256).unwrap();
        assert!(kid.is_some());
        let decoded = signer.verify(&token, TokenType::Access).unwrap();
        assert_eq!(decoded.sub, "alice");
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let signer = Signer::new(b"test-secret-key-for-signing");
        let (token, _) = signer.sign(&payload(), Algorithm::HS256).unwrap();
        let tampered = format!("{}x", token);
        assert!(signer.verify(&tampered, TokenType::Access).is_err());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let signer = Signer::new(b"first-secret");
        let other = Signer::new(b"second-secret");
        let (token, _) = signer.sign(&payload(), Algorithm::HS256).unwrap();
        assert!(other.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn expired_payload_still_decodes() {
        // Expiry handling is the caller's decision
        let signer = Signer::new(b"test-secret-key-for-signing");
        let mut claims = payload();
        claims.exp = Utc::now().timestamp() - 120;
        let (token, _) = signer.sign(&claims, Algorithm::HS256).unwrap();
        let decoded = signer.verify(&token, TokenType::Access).unwrap();
        assert!(decoded.is_expired());
    }
}
