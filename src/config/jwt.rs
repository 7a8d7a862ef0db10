// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JWT signing configuration
//!
//! Settings for the token signer: the HS256 secret and the lifetime of the
//! access tokens minted by the login and token endpoints. The RS256 key set
//! is not configured here; it is generated and rotated at runtime by the
//! key ring.

use serde::{Deserialize, Serialize};

/// Configuration for JWT issuance.
///
/// When `secret` is `None` the signer draws a fresh random secret at
/// startup, which invalidates all outstanding HS256 tokens on restart.
/// Production deployments set the `JWT_SECRET` environment variable or the
/// `jwt.secret` config key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for HMAC-based JWT token signing and verification.
    ///
    /// Used for tokens minted in OAuth mode. Interceptor-mode tokens use
    /// the rotating RS256 key set instead.
    #[serde(default)]
    pub secret: Option<String>,

    /// Access token lifetime in seconds. Default one hour.
    #[serde(default = "default_expiration")]
    pub expiration_seconds: i64,
}

fn default_expiration() -> i64 {
    3600
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            expiration_seconds: default_expiration(),
        }
    }
}
