// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP server of the authorization pipeline
//!
//! This module wires the Rocket application: the request context guard
//! that resolves tenant and client for every request, the five pipeline
//! endpoint groups (`/authorize`, `/login`, `/token`, `/logout`,
//! `/interceptor`), OpenID Connect discovery, the session cookie
//! handling, error rendering with content negotiation, and the health
//! and metrics surface.
//!
//! ## Architecture
//!
//! All shared components live in [`builder::AppState`], a single managed
//! state the handlers obtain through Rocket. Handlers never touch global
//! state; tests build their own `AppState` with their own stores.

pub mod authorize;
pub mod builder;
pub mod context;
pub mod discovery;
pub mod errors;
pub mod health;
pub mod interceptor;
pub mod login;
pub mod pages;
pub mod session;
pub mod token;

pub use builder::{build_rocket, AppState};
pub use context::{RequestContext, RequestMode};
pub use errors::PipelineError;
