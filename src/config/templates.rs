// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Template asset configuration
//!
//! Tenants may ship their own login/logout/error pages. The template
//! loader fetches them from the tenant's object-store location and writes
//! them below the view root configured here.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the per-tenant template loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Local directory the fetched template assets are written to,
    /// one subdirectory per tenant slug.
    #[serde(default = "default_view_root")]
    pub view_root: PathBuf,

    /// Per-fetch timeout in seconds. Default 10.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
}

fn default_view_root() -> PathBuf {
    PathBuf::from("./templates")
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            view_root: default_view_root(),
            fetch_timeout_seconds: default_fetch_timeout(),
        }
    }
}
