// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTML page rendering
//!
//! Renders the tenant-scoped pages (login form, logout interstitial,
//! landing) through the template registry and its fallback chain.

use serde_json::json;

use super::builder::AppState;
use super::context::RequestContext;
use super::errors::{reason, PipelineError};

/// Render the login page for the current tenant.
///
/// # Parameters
///
/// * `location` - Original request URI, posted back so `/authorize` can
///   resume after the form submission
/// * `error` - Localization key of a failed previous attempt, if any
pub fn render_login(
    state: &AppState,
    ctx: &RequestContext,
    location: &str,
    error: Option<&str>,
) -> Result<String, PipelineError> {
    let tenant = ctx.tenant.as_ref();
    let informations = tenant.and_then(|t| t.spec.informations.as_ref());
    let data = json!({
        "tenant": tenant.map(|t| t.name.clone()),
        "location": location,
        "error": error,
        "imprint_url": informations.and_then(|i| i.imprint_url.clone()),
        "privacy_url": informations.and_then(|i| i.privacy_url.clone()),
        "register_url": informations.and_then(|i| i.register_url.clone()),
    });
    state
        .templates
        .render(tenant.map(|t| t.name.as_str()), "login", &data)
        .map_err(|err| {
            log::error!("Login page rendering failed: {}", err);
            PipelineError::internal(reason::INTERNAL)
        })
}

/// Render the transient logout page.
///
/// The page navigates to `/logout/finalize` after about two seconds so
/// the browser has a chance to refresh its cookies first.
pub fn render_logout(
    state: &AppState,
    ctx: &RequestContext,
    location: &str,
) -> Result<String, PipelineError> {
    let tenant = ctx.tenant.as_ref();
    let finalize = format!(
        "/logout/finalize?location={}",
        urlencode(location)
    );
    let data = json!({
        "tenant": tenant.map(|t| t.name.clone()),
        "finalize_url": finalize,
    });
    state
        .templates
        .render(tenant.map(|t| t.name.as_str()), "logout", &data)
        .map_err(|err| {
            log::error!("Logout page rendering failed: {}", err);
            PipelineError::internal(reason::INTERNAL)
        })
}

/// Render the landing page.
pub fn render_index(state: &AppState, ctx: &RequestContext) -> Result<String, PipelineError> {
    let tenant = ctx.tenant.as_ref();
    let data = json!({
        "tenant": tenant.map(|t| t.name.clone()),
    });
    state
        .templates
        .render(tenant.map(|t| t.name.as_str()), "index", &data)
        .map_err(|err| {
            log::error!("Index page rendering failed: {}", err);
            PipelineError::internal(reason::INTERNAL)
        })
}

/// Percent-encode a query value.
pub fn urlencode(value: &str) -> String {
    serde_urlencoded::to_string([("q", value)])
        .map(|s| s.trim_start_matches("q=").to_string())
        .unwrap_or_default()
}
