// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OpenID Connect discovery
//!
//! `/.well-known/openid-configuration` is assembled per request from the
//! resolved tenant: the issuer is the request origin, the supported
//! scopes and grant types are the union over the tenant's clients, and
//! the tenant's legal links surface as policy and documentation URIs.
//! `/.well-known/jwks.json` publishes the RSA public key set, generating
//! the first key when the ring is still empty. Both documents are
//! cacheable for one hour.

use log::debug;
use rocket::http::{ContentType, Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::{get, State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Cursor;

use crate::domain::GrantType;
use crate::signing::jwks::JwkKeySet;

use super::builder::AppState;
use super::context::RequestContext;
use super::errors::{reason, PipelineError};

/// Cache lifetime of the discovery documents.
const CACHE_SECONDS: u32 = 3600;

/// JSON body with a `Cache-Control: max-age` header.
pub struct CachedJson<T>(pub T);

impl<'r, T: Serialize> Responder<'r, 'static> for CachedJson<T> {
    fn respond_to(self, _request: &'r Request<'_>) -> response::Result<'static> {
        let body = serde_json::to_string(&self.0).map_err(|_| Status::InternalServerError)?;
        Response::build()
            .header(ContentType::JSON)
            .header(Header::new(
                "Cache-Control",
                format!("max-age={}", CACHE_SECONDS),
            ))
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// OpenID Connect Discovery Configuration
///
/// This structure represents the OpenID Connect discovery document
/// returned by the `.well-known/openid-configuration` endpoint.
/// It follows the OpenID Connect Discovery 1.0 specification.
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    /// Issuer identifier the OP asserts: the request origin.
    pub issuer: String,

    /// URL of the OAuth 2.0 Authorization Endpoint.
    pub authorization_endpoint: String,

    /// URL of the OAuth 2.0 Token Endpoint.
    pub token_endpoint: String,

    /// URL of the UserInfo Endpoint.
    pub userinfo_endpoint: String,

    /// URL of the JSON Web Key Set document.
    pub jwks_uri: String,

    /// Supported `response_type` values.
    pub response_types_supported: Vec<String>,

    /// Supported grant types: the union over the tenant's clients plus
    /// the flows every tenant gets.
    pub grant_types_supported: Vec<String>,

    /// Supported Subject Identifier types.
    pub subject_types_supported: Vec<String>,

    /// JWS signing algorithms supported for the ID Token.
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// Supported scopes: the union over the tenant's clients plus the
    /// OpenID base scopes.
    pub scopes_supported: Vec<String>,

    /// Supported PKCE challenge methods.
    pub code_challenge_methods_supported: Vec<String>,

    /// Privacy policy of the tenant, when published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_policy_uri: Option<String>,

    /// Imprint of the tenant, when published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_documentation: Option<String>,
}

fn grant_type_name(grant: GrantType) -> &'static str {
    match grant {
        GrantType::AuthorizationCode => "authorization_code",
        GrantType::RefreshToken => "refresh_token",
        GrantType::Password => "password",
        GrantType::ClientCredentials => "client_credentials",
    }
}

/// `GET /.well-known/openid-configuration`
#[get("/.well-known/openid-configuration")]
pub async fn openid_configuration(
    ctx: RequestContext,
    app: &State<AppState>,
) -> Result<CachedJson<OpenIdConfiguration>, PipelineError> {
    let tenant = ctx
        .tenant
        .clone()
        .ok_or_else(|| PipelineError::bad_request(reason::NO_TENANT))?;
    let issuer = format!("{}://{}", ctx.scheme, ctx.host);
    debug!("Issuer for OpenID configuration: {}", issuer);

    // Sorted, duplicate-free unions over the tenant's clients
    let mut scopes: BTreeSet<String> =
        ["openid", "profile", "email"].iter().map(|s| s.to_string()).collect();
    let mut grants: BTreeSet<String> = [
        grant_type_name(GrantType::AuthorizationCode),
        grant_type_name(GrantType::RefreshToken),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for client in app.store.clients_of(&tenant.name) {
        scopes.extend(client.spec.scopes.iter().cloned());
        grants.extend(
            client
                .spec
                .grant_types
                .iter()
                .map(|g| grant_type_name(*g).to_string()),
        );
    }

    let informations = tenant.spec.informations.as_ref();

    Ok(CachedJson(OpenIdConfiguration {
        authorization_endpoint: format!("{}/authorize", issuer),
        token_endpoint: format!("{}/token", issuer),
        userinfo_endpoint: format!("{}/token/info", issuer),
        jwks_uri: format!("{}/.well-known/jwks.json", issuer),
        issuer,
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: grants.into_iter().collect(),
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        scopes_supported: scopes.into_iter().collect(),
        code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
        op_policy_uri: informations.and_then(|i| i.privacy_url.clone()),
        service_documentation: informations.and_then(|i| i.imprint_url.clone()),
    }))
}

/// `GET /.well-known/jwks.json`
#[get("/.well-known/jwks.json")]
pub async fn jwks(app: &State<AppState>) -> Result<CachedJson<JwkKeySet>, PipelineError> {
    let ring = app.signer.key_ring();
    let set = JwkKeySet::from_ring(ring).map_err(|err| {
        log::error!("JWKS export failed: {}", err);
        PipelineError::internal(reason::INTERNAL)
    })?;
    Ok(CachedJson(set))
}
