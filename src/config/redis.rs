// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! External key-value store configuration
//!
//! When a Redis host is configured the session store moves from the
//! in-process map to Redis, which lets several server replicas share
//! authorization codes and login sessions.

use serde::{Deserialize, Serialize};

/// Configuration for the Redis session store backend.
///
/// `host` unset means the in-memory backend is used. Both fields are
/// overridable with the `REDIS_HOST` and `REDIS_PASSWORD` environment
/// variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis host, either `host` or `host:port`. Port defaults to 6379.
    #[serde(default)]
    pub host: Option<String>,

    /// Optional Redis AUTH password.
    #[serde(default)]
    pub password: Option<String>,

    /// Per-operation timeout in seconds. Default 5.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_seconds: u64,
}

fn default_operation_timeout() -> u64 {
    5
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: None,
            password: None,
            operation_timeout_seconds: default_operation_timeout(),
        }
    }
}

impl RedisConfig {
    /// Build the `redis://` connection URL from host and password.
    ///
    /// Returns `None` when no host is configured.
    pub fn url(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let host = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:6379", host)
        };
        match &self.password {
            Some(password) => Some(format!("redis://:{}@{}", password, host)),
            None => Some(format!("redis://{}", host)),
        }
    }
}
