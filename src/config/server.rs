// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP server configuration
//!
//! This module defines the structure for configuring the authorization
//! server's HTTP front: bind address, port, the secure flag that decides
//! cookie attributes and default scheme, and the names of the headers and
//! cookies the pipeline reads.

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP front of the authorization server.
///
/// The `secure` flag governs two behaviours at once: the fallback request
/// scheme when no `X-Forwarded-Proto` header is present, and the `Secure`
/// attribute of the SSO cookie. Deployments behind a TLS-terminating
/// reverse proxy set it to `true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The TCP port the server will listen on.
    ///
    /// Valid range is 1-65534. Default value is 8080.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The network address the server will bind to.
    ///
    /// Can be an IPv4/IPv6 address or a hostname. Default is "127.0.0.1".
    /// Use "0.0.0.0" to bind to all IPv4 interfaces.
    #[serde(default = "default_address")]
    pub address: String,

    /// Whether the deployment is reachable over HTTPS.
    ///
    /// Controls the `Secure` cookie attribute and the scheme assumed for
    /// requests that carry no `X-Forwarded-Proto` header. Overridable with
    /// the `SECURE` environment variable.
    #[serde(default)]
    pub secure: bool,

    /// Fallback host used when a request carries neither `X-Forwarded-Host`
    /// nor `Host` and no tenant is registered.
    #[serde(default = "default_host")]
    pub default_host: String,

    /// Name of the browser session cookie carrying the JWT.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Name of the request header whose value `interceptor` switches a
    /// request into forward-auth mode.
    #[serde(default = "default_mode_header")]
    pub mode_header: String,

    /// Expose the `/metrics` counters endpoint.
    #[serde(default = "default_true")]
    pub expose_metrics: bool,

    /// Expose the `/versions` build string endpoint.
    #[serde(default = "default_true")]
    pub expose_versions: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_cookie_name() -> String {
    "uitsmijter-sso".to_string()
}

fn default_mode_header() -> String {
    "X-Auth-Mode".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            address: default_address(),
            secure: false,
            default_host: default_host(),
            cookie_name: default_cookie_name(),
            mode_header: default_mode_header(),
            expose_metrics: true,
            expose_versions: true,
        }
    }
}
