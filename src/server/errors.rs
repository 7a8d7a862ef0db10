// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Pipeline errors and their HTTP rendering
//!
//! Every failure of the authorization pipeline carries an HTTP status and
//! a localization key (e.g. `LOGIN.ERRORS.REDIRECT_MISMATCH`). The
//! responder negotiates the representation on the `Accept` header: HTML
//! clients receive the tenant's `error` template, everything else gets
//! `{"error": true, "reason": "<KEY>"}`. Stack traces never leak.

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use std::io::Cursor;

use super::builder::AppState;

/// Localization keys of the user-visible failures.
pub mod reason {
    pub const NO_CLIENT: &str = "LOGIN.ERRORS.NO_CLIENT";
    pub const NO_TENANT: &str = "LOGIN.ERRORS.NO_TENANT";
    pub const REDIRECT_MISMATCH: &str = "LOGIN.ERRORS.REDIRECT_MISMATCH";
    pub const REFERER_MISMATCH: &str = "LOGIN.ERRORS.REFERER_MISMATCH";
    pub const WRONG_REFERER: &str = "LOGIN.ERRORS.WRONG_REFERER";
    pub const BAD_LOGIN_ID: &str = "LOGIN.ERRORS.BAD_LOGIN_ID";
    pub const INVALID_USERNAME: &str = "LOGIN.ERRORS.INVALID_USERNAME";
    pub const INVALID_CREDENTIALS: &str = "LOGIN.ERRORS.INVALID_CREDENTIALS";
    pub const NO_LOGIN_PROVIDER: &str = "LOGIN.ERRORS.NO_LOGIN_PROVIDER";
    pub const PKCE_REQUIRED: &str = "LOGIN.ERRORS.PKCE_REQUIRED";
    pub const WRONG_CLIENT_SECRET: &str = "LOGIN.ERRORS.WRONG_CLIENT_SECRET";
    pub const TENANT_MISMATCH: &str = "LOGIN.ERRORS.TENANT_MISMATCH";
    pub const BAD_CHALLENGE_METHOD: &str = "LOGIN.ERRORS.BAD_CHALLENGE_METHOD";
    pub const MISSING_CHALLENGE: &str = "LOGIN.ERRORS.MISSING_CHALLENGE";
    pub const BAD_REQUEST: &str = "LOGIN.ERRORS.BAD_REQUEST";
    pub const INVALID_GRANT: &str = "TOKEN.ERRORS.INVALID_GRANT";
    pub const UNSUPPORTED_GRANT_TYPE: &str = "TOKEN.ERRORS.UNSUPPORTED_GRANT_TYPE";
    pub const VERIFIER_MISMATCH: &str = "TOKEN.ERRORS.VERIFIER_MISMATCH";
    pub const FORBIDDEN: &str = "GENERAL.ERRORS.FORBIDDEN";
    pub const UNAUTHORIZED: &str = "GENERAL.ERRORS.UNAUTHORIZED";
    pub const INTERNAL: &str = "GENERAL.ERRORS.INTERNAL";
    pub const UNAVAILABLE: &str = "GENERAL.ERRORS.UNAVAILABLE";
}

/// A pipeline failure with its HTTP status and localization key.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {reason}")]
pub struct PipelineError {
    /// HTTP status answered to the client.
    pub status: Status,

    /// Localization key, rendered into the error page and the JSON body.
    pub reason: String,
}

impl PipelineError {
    /// 400 with the given reason key.
    pub fn bad_request(reason: &str) -> Self {
        Self {
            status: Status::BadRequest,
            reason: reason.to_string(),
        }
    }

    /// 401 with the given reason key.
    pub fn unauthorized(reason: &str) -> Self {
        Self {
            status: Status::Unauthorized,
            reason: reason.to_string(),
        }
    }

    /// 403 with the given reason key.
    pub fn forbidden(reason: &str) -> Self {
        Self {
            status: Status::Forbidden,
            reason: reason.to_string(),
        }
    }

    /// 404 with the given reason key.
    pub fn not_found(reason: &str) -> Self {
        Self {
            status: Status::NotFound,
            reason: reason.to_string(),
        }
    }

    /// 409 with the given reason key.
    pub fn conflict(reason: &str) -> Self {
        Self {
            status: Status::Conflict,
            reason: reason.to_string(),
        }
    }

    /// 500 with the given reason key.
    pub fn internal(reason: &str) -> Self {
        Self {
            status: Status::InternalServerError,
            reason: reason.to_string(),
        }
    }

    /// 503 with the given reason key.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            status: Status::ServiceUnavailable,
            reason: reason.to_string(),
        }
    }
}

/// Whether the request prefers an HTML error page.
fn wants_html(request: &Request<'_>) -> bool {
    request
        .headers()
        .get_one("Accept")
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

impl<'r> Responder<'r, 'static> for PipelineError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        if wants_html(request) {
            if let Some(state) = request.rocket().state::<AppState>() {
                let slug = request
                    .local_cache(|| Option::<String>::None)
                    .as_deref()
                    .map(String::from);
                let data = json!({
                    "status": self.status.code,
                    "reason": self.reason,
                });
                if let Ok(html) = state.templates.render(slug.as_deref(), "error", &data) {
                    return Response::build()
                        .status(self.status)
                        .header(ContentType::HTML)
                        .sized_body(html.len(), Cursor::new(html))
                        .ok();
                }
            }
        }

        let body = json!({
            "error": true,
            "reason": self.reason,
        })
        .to_string();
        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
