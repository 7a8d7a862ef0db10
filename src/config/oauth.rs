// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OAuth pipeline tunables
//!
//! Lifetimes of the short-lived artifacts the authorization pipeline
//! creates: authorization codes, refresh tokens and post-login session
//! handles, plus the provider-script execution budget.

use serde::{Deserialize, Serialize};

/// Configuration for the authorization pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Authorization code lifetime in seconds. Default 600.
    #[serde(default = "default_authcode_ttl")]
    pub authcode_ttl_seconds: i64,

    /// Refresh token lifetime in seconds. Default 24 hours.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: i64,

    /// Lifetime of the single-use login session handed from `/login` back
    /// to `/authorize`. Default 120 seconds.
    #[serde(default = "default_login_session_ttl")]
    pub login_session_ttl_seconds: i64,

    /// When `true`, a refresh token is removed on first use and a new one
    /// is issued with the refreshed access token. When `false` (default)
    /// the refresh token stays valid until its TTL expires.
    #[serde(default)]
    pub rotate_refresh_tokens: bool,

    /// Per-run budget for tenant provider scripts in milliseconds.
    /// Default 3000.
    #[serde(default = "default_script_timeout")]
    pub script_timeout_ms: u64,
}

fn default_authcode_ttl() -> i64 {
    600
}

fn default_refresh_ttl() -> i64 {
    86_400
}

fn default_login_session_ttl() -> i64 {
    120
}

fn default_script_timeout() -> u64 {
    3000
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authcode_ttl_seconds: default_authcode_ttl(),
            refresh_ttl_seconds: default_refresh_ttl(),
            login_session_ttl_seconds: default_login_session_ttl(),
            rotate_refresh_tokens: false,
            script_timeout_ms: default_script_timeout(),
        }
    }
}
