// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Landing, health, version and metrics routes
//!
//! Liveness is unconditional; readiness follows the session store, so a
//! replica with a lost Redis connection leaves the load balancer pool.
//! The version and metrics surfaces are configuration gated.

use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::{get, State};

use super::builder::AppState;
use super::context::RequestContext;
use super::errors::PipelineError;
use super::pages;

/// `GET /`: landing page.
#[get("/")]
pub async fn index(
    ctx: RequestContext,
    app: &State<AppState>,
) -> Result<RawHtml<String>, PipelineError> {
    Ok(RawHtml(pages::render_index(app, &ctx)?))
}

/// `GET /health`: liveness.
#[get("/health")]
pub async fn health() -> Status {
    Status::NoContent
}

/// `GET /health/ready`: readiness, following the session store.
#[get("/health/ready")]
pub async fn health_ready(app: &State<AppState>) -> Status {
    if app.sessions.healthy().await {
        Status::NoContent
    } else {
        Status::ServiceUnavailable
    }
}

/// `GET /versions`: build string, when enabled.
#[get("/versions")]
pub async fn versions(app: &State<AppState>) -> Result<String, Status> {
    if !app.config.server.expose_versions {
        return Err(Status::NotFound);
    }
    let version = env!("CARGO_PKG_VERSION");
    let build = option_env!("BUILD_COMMIT").unwrap_or("unknown");
    Ok(format!("{} {} ({})", env!("CARGO_PKG_NAME"), version, build))
}

/// `GET /metrics`: counter exposition, when enabled.
#[get("/metrics")]
pub async fn metrics(app: &State<AppState>) -> Result<String, Status> {
    if !app.config.server.expose_metrics {
        return Err(Status::NotFound);
    }
    Ok(app.events.render())
}
