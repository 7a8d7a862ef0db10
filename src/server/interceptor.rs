// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Forward-auth endpoint
//!
//! A reverse proxy consults this endpoint for every upstream request.
//! 200 confirms the session and hands the proxy the headers to forward
//! (`Authorization` bearer and `X-User-Ident`); 401 carries a `Location`
//! to the tenant's login host which the proxy must surface as a
//! redirect. Expired tokens answer 401 so the client restarts the flow.

use log::debug;
use rocket::http::{Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::{get, post, State};
use std::io::Cursor;

use crate::events::Metric;

use super::builder::AppState;
use super::context::RequestContext;
use super::errors::{reason, PipelineError};
use super::pages;

/// Forward-auth verdict with the headers the proxy forwards.
pub struct InterceptorResponse {
    status: Status,
    headers: Vec<Header<'static>>,
}

impl InterceptorResponse {
    fn allowed(token: &str, subject: &str) -> Self {
        Self {
            status: Status::Ok,
            headers: vec![
                Header::new("Authorization", format!("Bearer {}", token)),
                Header::new("X-User-Ident", subject.to_string()),
            ],
        }
    }

    fn login_redirect(location: String) -> Self {
        Self {
            status: Status::Unauthorized,
            headers: vec![Header::new("Location", location)],
        }
    }
}

impl<'r> Responder<'r, 'static> for InterceptorResponse {
    fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
        let mut builder = Response::build();
        builder.status(self.status);
        for header in self.headers {
            builder.header(header);
        }
        builder.sized_body(0, Cursor::new(Vec::new()));
        builder.ok()
    }
}

/// `GET /interceptor`
#[get("/interceptor")]
pub async fn interceptor_get(
    ctx: RequestContext,
    app: &State<AppState>,
) -> Result<InterceptorResponse, PipelineError> {
    answer(ctx, app).await
}

/// `POST /interceptor`
#[post("/interceptor")]
pub async fn interceptor_post(
    ctx: RequestContext,
    app: &State<AppState>,
) -> Result<InterceptorResponse, PipelineError> {
    answer(ctx, app).await
}

async fn answer(
    ctx: RequestContext,
    app: &State<AppState>,
) -> Result<InterceptorResponse, PipelineError> {
    let tenant = ctx.tenant.clone().ok_or_else(|| {
        app.events.observe(Metric::InterceptorFailure);
        PipelineError::forbidden(reason::NO_TENANT)
    })?;

    if !tenant.interceptor_enabled() {
        app.events.observe(Metric::InterceptorFailure);
        return Err(PipelineError::forbidden(reason::FORBIDDEN));
    }

    // A valid, unexpired payload of this tenant passes; the context
    // already cleared payloads of foreign tenants
    if let (Some(payload), Some(token)) = (&ctx.valid_payload, &ctx.token) {
        app.events.observe(Metric::InterceptorSuccess);
        return Ok(InterceptorResponse::allowed(token, &payload.sub));
    }

    if ctx.expired {
        debug!("Interceptor rejecting expired session for {}", ctx.host);
    }

    let login_domain = tenant
        .interceptor_login_domain()
        .unwrap_or(&ctx.host)
        .to_string();
    let location = format!(
        "https://{}/login?for={}",
        login_domain,
        pages::urlencode(&ctx.service_url)
    );
    app.events.observe(Metric::InterceptorFailure);
    Ok(InterceptorResponse::login_redirect(location))
}
