// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OAuth 2.0 token endpoint
//!
//! Demultiplexes on `grant_type`:
//!
//! - `authorization_code`: single-use code exchange with PKCE
//!   verification, emits access plus refresh token
//! - `refresh_token`: mints a fresh access token from the stored
//!   payload; the refresh token stays valid until its TTL unless
//!   rotation is configured
//! - `password`: resource-owner credentials run through the tenant's
//!   login provider, access token only
//! - `client_credentials`: secret-authenticated service token
//!
//! `GET /token/info` answers the UserInfo-shaped claims of the presented
//! bearer.

use chrono::Utc;
use log::{debug, warn};
use rocket::form::{Form, FromForm};
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::Serialize;

use crate::domain::GrantType;
use crate::events::Metric;
use crate::scripting::{ProviderError, LOGIN_PROVIDER};
use crate::sessions::{AuthSession, PkceMethod, SessionKind};
use crate::signing::TokenPayload;

use super::builder::AppState;
use super::context::{RequestContext, RequestMode};
use super::errors::{reason, PipelineError};
use super::login::responsibility_hash;

/// Token endpoint request body (form encoded).
#[derive(FromForm)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: Option<String>,
}

/// Token endpoint success body.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// Wrapper observing the success/failure counters on drop of the
/// handler result.
fn observed<T>(app: &AppState, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
    match &result {
        Ok(_) => app.events.observe(Metric::OauthSuccess),
        Err(_) => app.events.observe(Metric::OauthFailure),
    }
    result
}

/// `POST /token`
#[post("/token", data = "<form>")]
pub async fn token(
    ctx: RequestContext,
    app: &State<AppState>,
    form: Form<TokenForm>,
) -> Result<Json<TokenResponse>, PipelineError> {
    app.events.observe(Metric::AuthorizeAttempts);
    let form = form.into_inner();

    let result = match form.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&ctx, app, &form).await,
        "refresh_token" => refresh_token_grant(&ctx, app, &form).await,
        "password" => password_grant(&ctx, app, &form).await,
        "client_credentials" => client_credentials_grant(&ctx, app, &form).await,
        other => {
            debug!("Unsupported grant type {:?}", other);
            Err(PipelineError::bad_request(reason::UNSUPPORTED_GRANT_TYPE))
        }
    };
    observed(app, result).map(Json)
}

/// Signing algorithm for the current request mode.
fn algorithm_for(ctx: &RequestContext) -> jsonwebtoken::Algorithm {
    match ctx.mode {
        RequestMode::OAuth => jsonwebtoken::Algorithm::HS256,
        RequestMode::Interceptor => jsonwebtoken::Algorithm::RS256,
    }
}

/// Mint an access token from a stored payload with a fresh validity
/// window.
fn mint_access_token(
    ctx: &RequestContext,
    app: &AppState,
    payload: &TokenPayload,
) -> Result<(String, TokenPayload), PipelineError> {
    let renewed = payload.renewed(chrono::Duration::seconds(app.config.jwt.expiration_seconds));
    let (token, _kid) = app
        .signer
        .sign(&renewed, algorithm_for(ctx))
        .map_err(|err| {
            warn!("Token signing failed: {}", err);
            PipelineError::internal(reason::INTERNAL)
        })?;
    Ok((token, renewed))
}

async fn authorization_code_grant(
    ctx: &RequestContext,
    app: &AppState,
    form: &TokenForm,
) -> Result<TokenResponse, PipelineError> {
    let client = ctx.resolve_client(app, form.client_id.as_deref())?;
    if !client.allows_grant(GrantType::AuthorizationCode) {
        return Err(PipelineError::forbidden(reason::FORBIDDEN));
    }

    let code = form
        .code
        .as_deref()
        .ok_or_else(|| PipelineError::bad_request(reason::INVALID_GRANT))?;

    // Single use: the code is consumed atomically
    let session = app
        .sessions
        .get(SessionKind::Code, code, true)
        .await
        .ok_or_else(|| PipelineError::bad_request(reason::INVALID_GRANT))?;

    // The redirect of the exchange must match the authorization
    if let Some(redirect) = form.redirect_uri.as_deref() {
        if redirect != session.redirect {
            app.events
                .deny(&client.id.to_string(), reason::REDIRECT_MISMATCH);
            return Err(PipelineError::bad_request(reason::REDIRECT_MISMATCH));
        }
    }
    if !client.verify_secret(form.client_secret.as_deref()) {
        app.events
            .deny(&client.id.to_string(), reason::WRONG_CLIENT_SECRET);
        return Err(PipelineError::unauthorized(reason::WRONG_CLIENT_SECRET));
    }

    // PKCE: a stored challenge requires the matching verifier
    if session.pkce_method != PkceMethod::None
        && !session.pkce_code().verify(form.code_verifier.as_deref())
    {
        app.events
            .deny(&client.id.to_string(), reason::VERIFIER_MISMATCH);
        return Err(PipelineError::bad_request(reason::VERIFIER_MISMATCH));
    }

    let (access_token, _) = mint_access_token(ctx, app, &session.payload)?;

    // The refresh token is a parallel session sharing the payload
    let refresh = AuthSession {
        kind: SessionKind::Refresh,
        code: crate::sessions::random_code(),
        state: session.state.clone(),
        scopes: session.scopes.clone(),
        payload: session.payload.clone(),
        redirect: session.redirect.clone(),
        pkce_method: PkceMethod::None,
        pkce_challenge: None,
        ttl_seconds: app.config.oauth.refresh_ttl_seconds,
        created_at: Utc::now(),
    };
    let refresh_token = refresh.code.clone();
    app.sessions.put(refresh).await.map_err(|err| {
        debug!("Could not store refresh token: {}", err);
        PipelineError::bad_request(reason::BAD_REQUEST)
    })?;
    app.events.observe(Metric::TokenStored);

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: app.config.jwt.expiration_seconds,
        refresh_token: Some(refresh_token),
        scope: session.scopes.join(" "),
    })
}

async fn refresh_token_grant(
    ctx: &RequestContext,
    app: &AppState,
    form: &TokenForm,
) -> Result<TokenResponse, PipelineError> {
    let presented = form
        .refresh_token
        .as_deref()
        .ok_or_else(|| PipelineError::bad_request(reason::INVALID_GRANT))?;

    let rotate = app.config.oauth.rotate_refresh_tokens;
    let session = app
        .sessions
        .get(SessionKind::Refresh, presented, rotate)
        .await
        .ok_or_else(|| PipelineError::bad_request(reason::INVALID_GRANT))?;

    let (access_token, _) = mint_access_token(ctx, app, &session.payload)?;

    let refresh_token = if rotate {
        let next = AuthSession {
            kind: SessionKind::Refresh,
            code: crate::sessions::random_code(),
            created_at: Utc::now(),
            ..session.clone()
        };
        let token = next.code.clone();
        app.sessions.put(next).await.map_err(|err| {
            debug!("Could not rotate refresh token: {}", err);
            PipelineError::bad_request(reason::BAD_REQUEST)
        })?;
        app.events.observe(Metric::TokenStored);
        token
    } else {
        presented.to_string()
    };

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: app.config.jwt.expiration_seconds,
        refresh_token: Some(refresh_token),
        scope: session.scopes.join(" "),
    })
}

async fn password_grant(
    ctx: &RequestContext,
    app: &AppState,
    form: &TokenForm,
) -> Result<TokenResponse, PipelineError> {
    let tenant = ctx.require_tenant()?;
    let (Some(username), Some(password)) = (form.username.as_deref(), form.password.as_deref())
    else {
        return Err(PipelineError::bad_request(reason::BAD_REQUEST));
    };

    // An explicit client restricts the grant and scopes the result
    let client = match form.client_id.as_deref() {
        Some(id) => {
            let client = ctx.resolve_client(app, Some(id))?;
            if !client.allows_grant(GrantType::Password) {
                return Err(PipelineError::forbidden(reason::FORBIDDEN));
            }
            if !client.verify_secret(form.client_secret.as_deref()) {
                return Err(PipelineError::unauthorized(reason::WRONG_CLIENT_SECRET));
            }
            Some(client)
        }
        None => None,
    };

    let scripts = &tenant.spec.provider_scripts;
    let sandbox = app.scripts.sandbox(scripts);
    let run = sandbox
        .run(
            LOGIN_PROVIDER,
            serde_json::json!({"username": username, "password": password}),
        )
        .await
        .map_err(|err| match err {
            ProviderError::Timeout => {
                // A hanging provider counts as a failed login
                app.events.observe(Metric::LoginFailure);
                PipelineError::forbidden(reason::INVALID_CREDENTIALS)
            }
            ProviderError::Internal(message) => {
                warn!("Sandbox failure: {}", message);
                PipelineError::internal(reason::INTERNAL)
            }
            other => {
                debug!("Password grant provider failure: {}", other);
                PipelineError::forbidden(reason::FORBIDDEN)
            }
        })?;

    let can_login = run.bool_property("canLogin").unwrap_or_else(|| run.decision());
    if !can_login {
        return Err(PipelineError::forbidden(reason::FORBIDDEN));
    }

    let mut payload = TokenPayload::new(
        run.subject_override().unwrap_or_else(|| username.to_string()),
        tenant.name.clone(),
        chrono::Duration::seconds(app.config.jwt.expiration_seconds),
    );
    payload.user = Some(username.to_string());
    payload.role = run.string_property("role");
    payload.profile = run.object_property("userProfile");
    payload.responsibility = Some(responsibility_hash(&ctx.responsible_domain));

    let (token, _kid) = app
        .signer
        .sign(&payload, algorithm_for(ctx))
        .map_err(|err| {
            warn!("Token signing failed: {}", err);
            PipelineError::internal(reason::INTERNAL)
        })?;

    // Proposed scopes still pass the client whitelist
    let scope = match &client {
        Some(client) => {
            let mut requested: Vec<String> = form
                .scope
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(String::from)
                .collect();
            requested.extend(run.proposed_scopes());
            client.allowed_scopes(&requested).join(" ")
        }
        None => String::new(),
    };

    // Password grant emits no refresh token
    Ok(TokenResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in: app.config.jwt.expiration_seconds,
        refresh_token: None,
        scope,
    })
}

async fn client_credentials_grant(
    ctx: &RequestContext,
    app: &AppState,
    form: &TokenForm,
) -> Result<TokenResponse, PipelineError> {
    let client = ctx.resolve_client(app, form.client_id.as_deref())?;
    if !client.allows_grant(GrantType::ClientCredentials) {
        return Err(PipelineError::forbidden(reason::FORBIDDEN));
    }

    // Service tokens require an actual secret match, not the
    // no-secret-configured pass
    let secret_ok = client.spec.secret.is_some()
        && client.verify_secret(form.client_secret.as_deref());
    if !secret_ok {
        app.events
            .deny(&client.id.to_string(), reason::WRONG_CLIENT_SECRET);
        return Err(PipelineError::unauthorized(reason::WRONG_CLIENT_SECRET));
    }

    let mut payload = TokenPayload::new(
        client.id.to_string(),
        client.spec.tenant_name.clone(),
        chrono::Duration::seconds(app.config.jwt.expiration_seconds),
    );
    payload.user = Some(client.name.clone());

    let (token, _kid) = app
        .signer
        .sign(&payload, algorithm_for(ctx))
        .map_err(|err| {
            warn!("Token signing failed: {}", err);
            PipelineError::internal(reason::INTERNAL)
        })?;

    let requested: Vec<String> = form
        .scope
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(String::from)
        .collect();

    Ok(TokenResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in: app.config.jwt.expiration_seconds,
        refresh_token: None,
        scope: client.allowed_scopes(&requested).join(" "),
    })
}

/// `GET /token/info`: UserInfo of the presented bearer.
#[get("/token/info")]
pub async fn token_info(ctx: RequestContext) -> Result<Json<TokenPayload>, PipelineError> {
    ctx.valid_payload
        .clone()
        .map(Json)
        .ok_or_else(|| PipelineError::unauthorized(reason::UNAUTHORIZED))
}
