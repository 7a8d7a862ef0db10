// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Login and logout endpoints
//!
//! `POST /login` takes the credentials form, consults the tenant's
//! provider scripts and, on success, mints the session token, sets the
//! SSO cookie and redirects back to the supplied location with a
//! single-use `loginid` so `/authorize` can resume without referrer
//! re-validation.
//!
//! Logout is a three-step dance: `GET /logout` renders a transient page
//! that navigates to `/logout/finalize` after about two seconds (letting
//! the browser refresh cookies), `POST /logout` short-circuits straight
//! to the redirect, and `/logout/finalize` kills the cookie, revokes the
//! subject's sessions and redirects to the requested location.

use log::{debug, warn};
use rocket::form::{Form, FromForm};
use rocket::http::CookieJar;
use rocket::response::content::RawHtml;
use rocket::response::Redirect;
use rocket::{get, post, Responder, State};
use sha2::{Digest, Sha256};

use crate::events::Metric;
use crate::scripting::{ProviderError, LOGIN_PROVIDER, VALIDATION_PROVIDER};
use crate::sessions::LoginSession;
use crate::signing::TokenPayload;

use super::builder::AppState;
use super::context::{RequestContext, RequestMode};
use super::errors::{reason, PipelineError};
use super::pages;
use super::session::{killed_cookie, session_cookie};

/// Credentials form of the login page.
#[derive(FromForm)]
pub struct LoginForm {
    /// Login name as typed by the user.
    pub username: String,

    /// Password as typed by the user; handed to the provider scripts
    /// verbatim and never stored.
    pub password: String,

    /// Original request URI to resume after the login.
    pub location: String,

    /// Scope hint carried through the form, when present.
    pub scope: Option<String>,
}

/// Outcome of the login endpoint.
#[derive(Responder)]
pub enum LoginOutcome {
    /// 303 back to the original location, `loginid` appended.
    Redirect(Redirect),
    /// 401 with the login page and an error message.
    #[response(status = 401, content_type = "html")]
    Rejected(RawHtml<String>),
}

/// `POST /login`
#[post("/login", data = "<form>")]
pub async fn login(
    ctx: RequestContext,
    app: &State<AppState>,
    cookies: &CookieJar<'_>,
    form: Form<LoginForm>,
) -> Result<LoginOutcome, PipelineError> {
    app.events.observe(Metric::LoginAttempts);

    let tenant = ctx.require_tenant()?;
    let scripts = &tenant.spec.provider_scripts;

    // Structural username validation, when the tenant ships one
    let has_validation = match crate::scripting::ScriptHost::defines_class(
        scripts,
        VALIDATION_PROVIDER,
    ) {
        Ok(defined) => defined,
        Err(err) => {
            warn!("Provider scripts of {} rejected: {}", tenant.name, err);
            return Err(PipelineError::forbidden(reason::FORBIDDEN));
        }
    };
    if has_validation {
        let sandbox = app.scripts.sandbox(scripts);
        let run = match sandbox
            .run(
                VALIDATION_PROVIDER,
                serde_json::json!({"username": form.username}),
            )
            .await
        {
            Ok(run) => run,
            Err(err) => return provider_failure(app, &ctx, &form.location, err),
        };
        let is_valid = run.bool_property("isValid").unwrap_or_else(|| run.decision());
        if !is_valid {
            app.events.observe(Metric::LoginFailure);
            let html =
                pages::render_login(app, &ctx, &form.location, Some(reason::INVALID_USERNAME))?;
            return Ok(LoginOutcome::Rejected(RawHtml(html)));
        }
    }

    let has_login = crate::scripting::ScriptHost::defines_class(scripts, LOGIN_PROVIDER)
        .map_err(|err| {
            warn!("Provider scripts of {} rejected: {}", tenant.name, err);
            PipelineError::forbidden(reason::FORBIDDEN)
        })?;

    let (subject, role, profile, can_login) = if has_login {
        let sandbox = app.scripts.sandbox(scripts);
        let run = sandbox
            .run(
                LOGIN_PROVIDER,
                serde_json::json!({"username": form.username, "password": form.password}),
            )
            .await;
        match run {
            Ok(run) => {
                let can_login = run.bool_property("canLogin").unwrap_or_else(|| run.decision());
                let subject = run
                    .subject_override()
                    .unwrap_or_else(|| form.username.clone());
                (
                    subject,
                    run.string_property("role"),
                    run.object_property("userProfile"),
                    can_login,
                )
            }
            Err(err) => return provider_failure(app, &ctx, &form.location, err),
        }
    } else if cfg!(debug_assertions) {
        // Development builds permit anonymous logins when the tenant
        // ships no login provider
        debug!("Tenant {} has no login provider, anonymous login", tenant.name);
        (form.username.clone(), None, None, true)
    } else {
        return Err(PipelineError::forbidden(reason::NO_LOGIN_PROVIDER));
    };

    if !can_login {
        app.events.observe(Metric::LoginFailure);
        let html =
            pages::render_login(app, &ctx, &form.location, Some(reason::INVALID_CREDENTIALS))?;
        return Ok(LoginOutcome::Rejected(RawHtml(html)));
    }

    // Mint the session token: symmetric in OAuth mode, rotating RS256 in
    // interceptor mode
    let mut payload = TokenPayload::new(
        subject,
        tenant.name.clone(),
        chrono::Duration::seconds(app.config.jwt.expiration_seconds),
    );
    payload.user = Some(form.username.clone());
    payload.role = role;
    payload.profile = profile;
    payload.responsibility = Some(responsibility_hash(&ctx.responsible_domain));

    let algorithm = match ctx.mode {
        RequestMode::OAuth => jsonwebtoken::Algorithm::HS256,
        RequestMode::Interceptor => jsonwebtoken::Algorithm::RS256,
    };
    let (token, _kid) = app
        .signer
        .sign(&payload, algorithm)
        .map_err(|err| {
            warn!("Token signing failed: {}", err);
            PipelineError::internal(reason::INTERNAL)
        })?;

    cookies.add(session_cookie(
        &app.config.server.cookie_name,
        token,
        app.config.server.secure,
        ctx.cookie_domain(),
    ));

    // Bridge into /authorize: single-use login session
    let login_session = LoginSession::new(app.config.oauth.login_session_ttl_seconds);
    let login_id = login_session.login_id.to_string();
    app.sessions.push(login_session).await;

    let separator = if form.location.contains('?') { '&' } else { '?' };
    let target = format!("{}{}loginid={}", form.location, separator, login_id);

    app.events.observe(Metric::LoginSuccess);
    Ok(LoginOutcome::Redirect(Redirect::to(target)))
}

/// Map a provider failure to its HTTP surface.
///
/// A hanging provider counts as a failed login and re-renders the form
/// with `INVALID_CREDENTIALS`. Other login-time provider errors are a
/// generic forbidden; only sandbox breakage is an internal error.
fn provider_failure(
    app: &AppState,
    ctx: &RequestContext,
    location: &str,
    err: ProviderError,
) -> Result<LoginOutcome, PipelineError> {
    app.events.observe(Metric::LoginFailure);
    match err {
        ProviderError::Timeout => {
            let html =
                pages::render_login(app, ctx, location, Some(reason::INVALID_CREDENTIALS))?;
            Ok(LoginOutcome::Rejected(RawHtml(html)))
        }
        ProviderError::Internal(message) => {
            warn!("Sandbox failure: {}", message);
            Err(PipelineError::internal(reason::INTERNAL))
        }
        other => {
            debug!("Provider declined: {}", other);
            Err(PipelineError::forbidden(reason::FORBIDDEN))
        }
    }
}

/// Stable digest of the cookie-scope domain, bound into the token so a
/// token stolen from one domain cannot be reused on another.
pub fn responsibility_hash(domain: &str) -> String {
    Sha256::digest(domain.to_ascii_lowercase().as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// `GET /logout`: transient page auto-navigating to the finalizer.
#[get("/logout?<location>")]
pub async fn logout_page(
    ctx: RequestContext,
    app: &State<AppState>,
    location: Option<&str>,
) -> Result<RawHtml<String>, PipelineError> {
    let html = pages::render_logout(app, &ctx, location.unwrap_or("/"))?;
    Ok(RawHtml(html))
}

/// `POST /logout`: immediate redirect into the finalizer.
#[post("/logout?<location>")]
pub async fn logout_submit(location: Option<&str>) -> Redirect {
    Redirect::to(format!(
        "/logout/finalize?location={}",
        pages::urlencode(location.unwrap_or("/"))
    ))
}

/// `GET /logout/finalize`: kill the cookie, revoke the subject's
/// sessions and redirect.
#[get("/logout/finalize?<location>")]
pub async fn logout_finalize(
    ctx: RequestContext,
    app: &State<AppState>,
    cookies: &CookieJar<'_>,
    location: Option<&str>,
) -> Redirect {
    cookies.add(killed_cookie(
        &app.config.server.cookie_name,
        app.config.server.secure,
        ctx.cookie_domain(),
    ));

    if let (Some(tenant), Some(subject)) = (&ctx.tenant, &ctx.subject) {
        app.sessions.wipe(&tenant.name, subject).await;
    }
    app.events.observe(Metric::Logout);

    Redirect::to(location.unwrap_or("/").to_string())
}
