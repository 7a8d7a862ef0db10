// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rust Authgate Library
//!
//! A multi-tenant OAuth 2.0 / OpenID Connect authorization server with a
//! forward-auth ("interceptor") mode for reverse proxies. The server
//! issues, validates and revokes access tokens for pre-registered client
//! applications belonging to isolated tenants.
//!
//! ## Main Components
//!
//! - **Domain**: Tenants, clients and the process-wide entity store
//! - **Loader**: Declarative entity sources (watched directory, cluster
//!   control plane) with hot reload
//! - **Scripting**: Per-tenant sandboxed provider scripts deciding logins
//! - **Sessions**: TTL store of authorization codes and login sessions
//!   (memory or Redis)
//! - **Signing**: HS256/RS256 JWT signing with key rotation and JWKS
//! - **Server**: The Rocket application with the authorization pipeline
//! - **Templates**: Per-tenant page templates fetched from object storage
//!
//! ## Usage
//!
//! This library can be used either:
//!
//! 1. As a dependency for embedding the authorization pipeline
//! 2. Through the provided binary for running the server
//!
//! ## Binary
//!
//! The `rust_authgate` executable offers two subcommands: `serve` runs
//! the daemon, `routes` dumps the registered HTTP routes.

/// Configuration handling for the authorization server.
///
/// Provides functionality for loading, validating, and managing
/// application settings including server, token and entity-source
/// configuration.
pub mod config;

/// Daemon coordinating the background services.
pub mod daemon;

/// Entity model: tenants, clients and the process-wide store.
pub mod domain;

/// Named counters and status back-reporting.
pub mod events;

/// Declarative entity loading with hot reload.
pub mod loader;

/// Sandboxed per-tenant provider scripts.
pub mod scripting;

/// Authorization code and login session store.
pub mod sessions;

/// JWT signing, key rotation and JWKS export.
pub mod signing;

/// The Rocket application with the authorization pipeline.
pub mod server;

/// Per-tenant page templates.
pub mod templates;
