// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request context resolution
//!
//! A request guard that classifies every incoming request before the
//! pipeline handlers run: which scheme and host the request targets
//! (honouring the forwarding headers a reverse proxy sets), whether it is
//! a plain OAuth call or a forward-auth interceptor call, which tenant is
//! responsible for the host, and which authenticated payload (bearer
//! header or session cookie) the request carries.
//!
//! Client resolution happens in the handlers (the body is theirs), via
//! [`RequestContext::resolve_client`].

use log::debug;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use std::fmt::Debug;
use std::sync::Arc;

use crate::domain::{Client, Tenant};
use crate::signing::{SignerError, TokenType};

use super::builder::AppState;
use super::errors::{reason, PipelineError};

/// Whether a request is a plain OAuth call or a forward-auth query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Regular OAuth/OIDC traffic.
    OAuth,
    /// Forward-auth query from a reverse proxy.
    Interceptor,
}

/// Per-request context attached by the resolver guard.
pub struct RequestContext {
    /// `http` or `https`, from `X-Forwarded-Proto` or the secure flag.
    pub scheme: String,

    /// Request host, from `X-Forwarded-Host`, `Host`, the first tenant
    /// host, or the configured default: in that order.
    pub host: String,

    /// Original request URI (path and query).
    pub uri: String,

    /// OAuth or interceptor mode.
    pub mode: RequestMode,

    /// The domain responsible for this request's session scope.
    pub responsible_domain: String,

    /// `Referer` header, when present.
    pub referer: Option<String>,

    /// Absolute URL of the original request.
    pub service_url: String,

    /// Tenant resolved from the host, when any matches.
    pub tenant: Option<Arc<Tenant>>,

    /// Raw bearer token as presented, when any.
    pub token: Option<String>,

    /// Verified, unexpired token payload matching the resolved tenant.
    pub valid_payload: Option<crate::signing::TokenPayload>,

    /// True iff a structurally valid token was presented whose expiry
    /// lies in the past.
    pub expired: bool,

    /// Subject of the valid payload.
    pub subject: Option<String>,
}

impl RequestContext {
    /// Resolve a client candidate against the entity store.
    ///
    /// The candidate is the `client_id` taken from the request body
    /// first, then the query: the handlers own both and pass the first
    /// value present. Missing or unknown ids are a bad request carrying
    /// `LOGIN.ERRORS.NO_CLIENT`.
    pub fn resolve_client(
        &self,
        state: &AppState,
        candidate: Option<&str>,
    ) -> Result<Arc<Client>, PipelineError> {
        let id = candidate
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::bad_request(reason::NO_CLIENT))?;
        state
            .store
            .client(id)
            .ok_or_else(|| PipelineError::bad_request(reason::NO_CLIENT))
    }

    /// The tenant of this request, or a bad request error.
    pub fn require_tenant(&self) -> Result<Arc<Tenant>, PipelineError> {
        self.tenant
            .clone()
            .ok_or_else(|| PipelineError::bad_request(reason::NO_TENANT))
    }

    /// Cookie `Domain` attribute for the current mode.
    ///
    /// Blank in OAuth mode; the tenant's configured cookie domain in
    /// interceptor mode.
    pub fn cookie_domain(&self) -> Option<String> {
        match self.mode {
            RequestMode::OAuth => None,
            RequestMode::Interceptor => self
                .tenant
                .as_ref()
                .and_then(|t| t.interceptor_cookie_domain())
                .map(String::from),
        }
    }
}

impl Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("uri", &self.uri)
            .field("mode", &self.mode)
            .field("tenant", &self.tenant.as_ref().map(|t| &t.name))
            .field("subject", &self.subject)
            .field("expired", &self.expired)
            .finish()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestContext {
    type Error = ();

    /// Construct the request context.
    ///
    /// Never fails for anonymous requests: token problems degrade to an
    /// anonymous context, exactly like an absent token. Only a missing
    /// application state is an error.
    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = request.rocket().state::<AppState>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };
        let config = &state.config.server;

        // Scheme: forwarded proto, else per deployment flag
        let scheme = request
            .headers()
            .get_one("X-Forwarded-Proto")
            .map(String::from)
            .unwrap_or_else(|| {
                if config.secure {
                    "https".to_string()
                } else {
                    "http".to_string()
                }
            });

        // Host: forwarded host, host header, first registered tenant
        // host, configured default
        let host = request
            .headers()
            .get_one("X-Forwarded-Host")
            .map(String::from)
            .or_else(|| request.host().map(|h| h.to_string()))
            .or_else(|| {
                state
                    .store
                    .tenants()
                    .first()
                    .and_then(|t| t.spec.hosts.first().cloned())
            })
            .unwrap_or_else(|| config.default_host.clone());

        let mode = match request.headers().get_one(&config.mode_header) {
            Some(value) if value.eq_ignore_ascii_case("interceptor") => RequestMode::Interceptor,
            _ => RequestMode::OAuth,
        };

        let uri = request.uri().to_string();
        let service_url = format!("{}://{}{}", scheme, host, uri);
        let referer = request.headers().get_one("Referer").map(String::from);

        let tenant = state.store.tenant_for_host(&host);

        // Make the tenant slug available to the error responder
        let slug = tenant.as_ref().map(|t| t.name.clone());
        request.local_cache(|| slug);

        // Token: Authorization bearer, else the session cookie (the
        // bridge fairing usually copied it into the header already)
        let token = request
            .headers()
            .get_one("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(String::from)
            .or_else(|| {
                request
                    .cookies()
                    .get(&config.cookie_name)
                    .map(|cookie| cookie.value().to_string())
            })
            .filter(|token| !token.is_empty() && token != "invalid");

        let mut valid_payload = None;
        let mut expired = false;
        if let Some(raw) = &token {
            match state.signer.verify(raw, TokenType::Access) {
                Ok(payload) => {
                    let tenant_matches = tenant
                        .as_ref()
                        .map(|t| t.name == payload.tenant)
                        .unwrap_or(false);
                    if !tenant_matches {
                        debug!("Token tenant {:?} does not match host tenant", payload.tenant);
                    } else if payload.is_expired() {
                        expired = true;
                    } else {
                        valid_payload = Some(payload);
                    }
                }
                Err(SignerError::InvalidToken) => {
                    debug!("Presented token did not verify, treating as anonymous");
                }
                Err(err) => {
                    debug!("Token verification failed: {}", err);
                }
            }
        }

        let subject = valid_payload.as_ref().map(|p| p.sub.clone());
        let responsible_domain = host.clone();

        Outcome::Success(RequestContext {
            scheme,
            host,
            uri,
            mode,
            responsible_domain,
            referer,
            service_url,
            tenant,
            token,
            valid_payload,
            expired,
            subject,
        })
    }
}
