// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OAuth 2.0 authorization endpoint
//!
//! State machine: Unauthenticated → LoginRequired → Authenticated →
//! CodeIssued. An unauthenticated browser gets the login page (401) with
//! the original URI to re-enter after the form; an authenticated one gets
//! a fresh authorization code bound to the validated redirect target and,
//! when requested, to a PKCE challenge.

use chrono::Utc;
use log::debug;
use rocket::get;
use rocket::response::content::RawHtml;
use rocket::response::Redirect;
use rocket::{Responder, State};

use crate::events::Metric;
use crate::sessions::{AuthSession, PkceMethod, SessionKind};

use super::builder::AppState;
use super::context::RequestContext;
use super::errors::{reason, PipelineError};
use super::pages;

/// Outcome of the authorization endpoint: a redirect carrying the code,
/// or the login page.
#[derive(Responder)]
pub enum AuthorizeOutcome {
    /// 303 to the client's redirect target with `code` and `state`.
    Redirect(Redirect),
    /// 401 with the tenant's login page.
    #[response(status = 401, content_type = "html")]
    LoginRequired(RawHtml<String>),
}

/// `GET /authorize`
///
/// # Query Parameters
///
/// Standard OAuth 2.0 authorization request parameters, plus the
/// `loginid` handle `/login` appends on its post-login redirect.
#[allow(clippy::too_many_arguments)]
#[get("/authorize?<response_type>&<client_id>&<redirect_uri>&<scope>&<state>&<code_challenge>&<code_challenge_method>&<client_secret>&<loginid>")]
pub async fn authorize(
    ctx: RequestContext,
    app: &State<AppState>,
    response_type: Option<&str>,
    client_id: Option<&str>,
    redirect_uri: Option<&str>,
    scope: Option<&str>,
    state: Option<&str>,
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
    client_secret: Option<&str>,
    loginid: Option<&str>,
) -> Result<AuthorizeOutcome, PipelineError> {
    app.events.observe(Metric::AuthorizeAttempts);

    // Decode the request variant: plain or PKCE
    let method = PkceMethod::parse(code_challenge_method)
        .map_err(|_| PipelineError::bad_request(reason::BAD_CHALLENGE_METHOD))?;
    if method == PkceMethod::S256 && code_challenge.map(str::trim).unwrap_or("").is_empty() {
        return Err(PipelineError::bad_request(reason::MISSING_CHALLENGE));
    }
    if response_type != Some("code") {
        return Err(PipelineError::bad_request(reason::BAD_REQUEST));
    }

    let client = ctx.resolve_client(app, client_id)?;
    let tenant = app
        .store
        .tenant(&client.spec.tenant_name)
        .ok_or_else(|| PipelineError::bad_request(reason::NO_TENANT))?;

    // A loginid marks the re-entry after a successful form login; it is
    // single-use
    let via_login = match loginid {
        Some(id) => {
            if !app.sessions.pull(id).await {
                return Err(PipelineError::bad_request(reason::BAD_LOGIN_ID));
            }
            true
        }
        None => false,
    };

    // Referrer enforcement applies to first entries only
    if !via_login && client.has_referrer_restriction() {
        let Some(referer) = ctx.referer.as_deref() else {
            app.events.deny(&client.id.to_string(), reason::WRONG_REFERER);
            return Err(PipelineError::bad_request(reason::WRONG_REFERER));
        };
        if client.checked_referrer(referer).is_err() {
            app.events
                .deny(&client.id.to_string(), reason::REFERER_MISMATCH);
            return Err(PipelineError::forbidden(reason::REFERER_MISMATCH));
        }
    }

    // A tenant that disabled silent login wants a fresh form submission
    // on every first entry
    let mut payload = ctx.valid_payload.clone();
    if !tenant.silent_login() && !via_login {
        debug!("Tenant {} has silent login disabled", tenant.name);
        payload = None;
    }

    let Some(payload) = payload else {
        let html = pages::render_login(app, &ctx, &ctx.uri, None)?;
        return Ok(AuthorizeOutcome::LoginRequired(RawHtml(html)));
    };

    // Authenticated: the payload must belong to the client's tenant
    if payload.tenant != tenant.name {
        app.events
            .deny(&client.id.to_string(), reason::TENANT_MISMATCH);
        return Err(PipelineError::forbidden(reason::TENANT_MISMATCH));
    }
    if client.spec.is_pkce_only && method == PkceMethod::None {
        app.events.deny(&client.id.to_string(), reason::PKCE_REQUIRED);
        return Err(PipelineError::forbidden(reason::PKCE_REQUIRED));
    }
    if !client.verify_secret(client_secret) {
        app.events
            .deny(&client.id.to_string(), reason::WRONG_CLIENT_SECRET);
        return Err(PipelineError::unauthorized(reason::WRONG_CLIENT_SECRET));
    }

    let redirect = redirect_uri
        .ok_or_else(|| PipelineError::bad_request(reason::REDIRECT_MISMATCH))
        .and_then(|candidate| {
            client.checked_redirect(candidate).map_err(|_| {
                app.events
                    .deny(&client.id.to_string(), reason::REDIRECT_MISMATCH);
                PipelineError::bad_request(reason::REDIRECT_MISMATCH)
            })
        })?;

    let requested: Vec<String> = scope
        .unwrap_or_default()
        .split_whitespace()
        .map(String::from)
        .collect();
    let granted = client.allowed_scopes(&requested);

    let session = AuthSession {
        kind: SessionKind::Code,
        code: crate::sessions::random_code(),
        state: state.unwrap_or_default().to_string(),
        scopes: granted,
        payload,
        redirect: redirect.to_string(),
        pkce_method: method,
        pkce_challenge: code_challenge.map(String::from),
        ttl_seconds: app.config.oauth.authcode_ttl_seconds,
        created_at: Utc::now(),
    };
    let code = session.code.clone();
    let state_echo = session.state.clone();

    app.sessions
        .put(session)
        .await
        .map_err(|err| {
            debug!("Could not store authorization code: {}", err);
            PipelineError::bad_request(reason::BAD_REQUEST)
        })?;
    app.events.observe(Metric::TokenStored);

    let separator = if redirect.contains('?') { '&' } else { '?' };
    let target = format!(
        "{}{}code={}&state={}",
        redirect,
        separator,
        code,
        pages::urlencode(&state_echo)
    );
    Ok(AuthorizeOutcome::Redirect(Redirect::to(target)))
}
