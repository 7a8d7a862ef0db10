// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for the forward-auth interceptor endpoint
//!
//! Simulates a reverse proxy consulting `/interceptor` for upstream
//! requests of a tenant with interception enabled: anonymous requests
//! are answered 401 with a `Location` to the login host, valid sessions
//! pass with the forwarding headers set, expired sessions restart.

use rocket::http::{Cookie, Header, Status};
use rocket::local::asynchronous::Client;
use rust_authgate::config::Config;
use rust_authgate::domain::tenant::{InterceptorSettings, TenantSpec};
use rust_authgate::domain::{EntityRef, Tenant};
use rust_authgate::server::{build_rocket, AppState};
use rust_authgate::signing::TokenPayload;
use std::path::PathBuf;

const TEST_SECRET: &str = "test-hmac-secret-key-for-testing";

fn seed(state: &AppState) {
    state
        .store
        .insert_tenant(Tenant {
            name: "toll".into(),
            reference: EntityRef::File {
                path: PathBuf::from("/t/toll.yaml"),
            },
            spec: TenantSpec {
                hosts: vec!["*.t.test".into()],
                interceptor: Some(InterceptorSettings {
                    enabled: true,
                    domain: Some("login.t.test".into()),
                    cookie: Some(".t.test".into()),
                }),
                silent_login: true,
                provider_scripts: vec![],
                templates: None,
                informations: None,
            },
        })
        .unwrap();

    state
        .store
        .insert_tenant(Tenant {
            name: "plain".into(),
            reference: EntityRef::File {
                path: PathBuf::from("/t/plain.yaml"),
            },
            spec: TenantSpec {
                hosts: vec!["plain.test".into()],
                interceptor: None,
                silent_login: true,
                provider_scripts: vec![],
                templates: None,
                informations: None,
            },
        })
        .unwrap();
}

async fn test_client() -> Client {
    let mut config = Config::default();
    config.jwt.secret = Some(TEST_SECRET.to_string());
    let state = AppState::from_config(config);
    seed(&state);
    Client::untracked(build_rocket(state)).await.expect("valid rocket instance")
}

fn rs256_token(client: &Client, sub: &str, tenant: &str, expired: bool) -> String {
    let state = client.rocket().state::<AppState>().unwrap();
    let mut payload = TokenPayload::new(sub, tenant, chrono::Duration::hours(1));
    if expired {
        payload.exp = chrono::Utc::now().timestamp() - 60;
    }
    let (token, kid) = state
        .signer
        .sign(&payload, jsonwebtoken::Algorithm::RS256)
        .unwrap();
    assert!(kid.is_some());
    token
}

#[rocket::async_test]
async fn test_anonymous_requests_are_sent_to_the_login_host() {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = test_client().await;

    let response = client
        .get("/interceptor")
        .header(Header::new("X-Forwarded-Host", "page.t.test"))
        .header(Header::new("X-Forwarded-Proto", "https"))
        .header(Header::new("X-Auth-Mode", "interceptor"))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
    let location = response.headers().get_one("Location").unwrap();
    assert!(location.starts_with("https://login.t.test/login?for="));
}

#[rocket::async_test]
async fn test_valid_sessions_pass_with_forwarding_headers() {
    let client = test_client().await;
    let token = rs256_token(&client, "alice", "toll", false);

    let response = client
        .get("/interceptor")
        .header(Header::new("X-Forwarded-Host", "page.t.test"))
        .header(Header::new("X-Auth-Mode", "interceptor"))
        .cookie(Cookie::new("uitsmijter-sso", token.clone()))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    assert_eq!(
        response.headers().get_one("X-User-Ident").unwrap(),
        "alice"
    );
    assert_eq!(
        response.headers().get_one("Authorization").unwrap(),
        format!("Bearer {}", token)
    );
}

#[rocket::async_test]
async fn test_expired_sessions_restart_the_flow() {
    let client = test_client().await;
    let token = rs256_token(&client, "alice", "toll", true);

    let response = client
        .get("/interceptor")
        .header(Header::new("X-Forwarded-Host", "page.t.test"))
        .header(Header::new("X-Auth-Mode", "interceptor"))
        .cookie(Cookie::new("uitsmijter-sso", token))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
    assert!(response
        .headers()
        .get_one("Location")
        .unwrap()
        .starts_with("https://login.t.test/login?for="));
}

#[rocket::async_test]
async fn test_foreign_tenant_tokens_do_not_pass() {
    let client = test_client().await;
    // Structurally valid token of another tenant
    let token = rs256_token(&client, "alice", "plain", false);

    let response = client
        .get("/interceptor")
        .header(Header::new("X-Forwarded-Host", "page.t.test"))
        .header(Header::new("X-Auth-Mode", "interceptor"))
        .cookie(Cookie::new("uitsmijter-sso", token))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn test_tenants_without_interception_refuse() {
    let client = test_client().await;
    let response = client
        .get("/interceptor")
        .header(Header::new("X-Forwarded-Host", "plain.test"))
        .header(Header::new("X-Auth-Mode", "interceptor"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_wildcard_hosts_resolve_the_tenant() {
    let client = test_client().await;

    // One label matches
    let response = client
        .get("/interceptor")
        .header(Header::new("X-Forwarded-Host", "x-1.t.test"))
        .header(Header::new("X-Auth-Mode", "interceptor"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);

    // Two labels do not
    let response = client
        .get("/interceptor")
        .header(Header::new("X-Forwarded-Host", "x.y.t.test"))
        .header(Header::new("X-Auth-Mode", "interceptor"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}
