// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for provider-script logins
//!
//! Exercises the form login (`POST /login`) and the resource-owner
//! password grant against a tenant whose login decision is made by a
//! provider script. Covers the username validation provider, the
//! post-login `loginid` bridge into `/authorize`, and the logout chain.

use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use rust_authgate::config::Config;
use rust_authgate::domain::client::ClientSpec;
use rust_authgate::domain::tenant::TenantSpec;
use rust_authgate::domain::{Client as OAuthClient, EntityRef, GrantType, Tenant};
use rust_authgate::server::{build_rocket, AppState};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

const TEST_SECRET: &str = "test-hmac-secret-key-for-testing";
const CLIENT_ID: &str = "37d9f50e-0f83-4ad1-8e6f-62cb81d2d0ed";

const LOGIN_SCRIPT: &str = r#"
fn UserLoginProvider(credentials) {
    let ok = credentials.username == "valid_user"
        && credentials.password == "valid_password";
    commit(ok);
    #{ canLogin: ok, userProfile: #{ name: "Valid User" }, role: "staff" }
}
"#;

const VALIDATION_SCRIPT: &str = r#"
fn UserValidationProvider(subject) {
    let valid = !subject.username.contains(" ");
    commit(valid);
    #{ isValid: valid }
}
"#;

fn seed(state: &AppState) {
    state
        .store
        .insert_tenant(Tenant {
            name: "acme".into(),
            reference: EntityRef::File {
                path: PathBuf::from("/t/acme.yaml"),
            },
            spec: TenantSpec {
                hosts: vec!["example.com".into()],
                interceptor: None,
                silent_login: true,
                provider_scripts: vec![
                    LOGIN_SCRIPT.to_string(),
                    VALIDATION_SCRIPT.to_string(),
                ],
                templates: None,
                informations: None,
            },
        })
        .unwrap();

    state
        .store
        .insert_client(OAuthClient {
            id: Uuid::parse_str(CLIENT_ID).unwrap(),
            name: "acme-app".into(),
            reference: EntityRef::File {
                path: PathBuf::from("/c/app.yaml"),
            },
            spec: ClientSpec {
                tenant_name: "acme".into(),
                redirect_urls: vec![r"https://app\.example\.com/.*".into()],
                grant_types: vec![
                    GrantType::AuthorizationCode,
                    GrantType::RefreshToken,
                    GrantType::Password,
                ],
                scopes: vec!["read".into()],
                referrers: vec![],
                secret: None,
                is_pkce_only: false,
            },
        })
        .unwrap();
}

async fn test_client() -> Client {
    let mut config = Config::default();
    config.jwt.secret = Some(TEST_SECRET.to_string());
    let state = AppState::from_config(config);
    seed(&state);
    Client::tracked(build_rocket(state)).await.expect("valid rocket instance")
}

#[rocket::async_test]
async fn test_form_login_bridges_into_authorize() {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = test_client().await;

    let original = format!(
        "/authorize?response_type=code&client_id={}&redirect_uri=https://app.example.com/cb&scope=read&state=xyz",
        CLIENT_ID
    );

    // Submit valid credentials
    let response = client
        .post("/login")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(ContentType::Form)
        .body(format!(
            "username=valid_user&password=valid_password&location={}",
            pct(&original)
        ))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::SeeOther);

    let location = response.headers().get_one("Location").unwrap().to_string();
    assert!(location.contains("loginid="));

    // The tracked client carries the SSO cookie into the re-entry
    let response = client
        .get(location)
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::SeeOther);
    let redirect = response.headers().get_one("Location").unwrap();
    assert!(redirect.starts_with("https://app.example.com/cb?code="));
}

#[rocket::async_test]
async fn test_login_ids_are_single_use() {
    let client = test_client().await;
    let original = format!(
        "/authorize?response_type=code&client_id={}&redirect_uri=https://app.example.com/cb&state=1",
        CLIENT_ID
    );

    let response = client
        .post("/login")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(ContentType::Form)
        .body(format!(
            "username=valid_user&password=valid_password&location={}",
            pct(&original)
        ))
        .dispatch()
        .await;
    let location = response.headers().get_one("Location").unwrap().to_string();

    let first = client
        .get(location.clone())
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .dispatch()
        .await;
    assert_eq!(first.status(), Status::SeeOther);

    // Replaying the loginid fails
    let second = client
        .get(location)
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .dispatch()
        .await;
    assert_eq!(second.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn test_wrong_credentials_rerender_the_login_page() {
    let client = test_client().await;

    let response = client
        .post("/login")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(ContentType::Form)
        .body(format!(
            "username=valid_user&password=wrong&location={}",
            pct("/authorize?x=1")
        ))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    let html = response.into_string().await.unwrap();
    assert!(html.contains("LOGIN.ERRORS.INVALID_CREDENTIALS"));
}

#[rocket::async_test]
async fn test_invalid_username_is_rejected_by_the_validation_provider() {
    let client = test_client().await;

    let response = client
        .post("/login")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(ContentType::Form)
        .body(format!(
            "username=user%20with%20spaces&password=whatever&location={}",
            pct("/authorize?x=1")
        ))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);
    let html = response.into_string().await.unwrap();
    assert!(html.contains("LOGIN.ERRORS.INVALID_USERNAME"));
}

#[rocket::async_test]
async fn test_password_grant_mints_access_token_only() {
    let client = test_client().await;

    let response = client
        .post("/token")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(ContentType::Form)
        .body("grant_type=password&username=valid_user&password=valid_password")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert!(body["access_token"].as_str().is_some());
    assert_eq!(body["token_type"], "Bearer");
    assert!(body.get("refresh_token").is_none());
}

#[rocket::async_test]
async fn test_password_grant_rejects_wrong_credentials() {
    let client = test_client().await;

    let response = client
        .post("/token")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(ContentType::Form)
        .body("grant_type=password&username=valid_user&password=nope")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_logout_chain_kills_the_session_cookie() {
    let client = test_client().await;

    // Establish a session first
    let response = client
        .post("/login")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(ContentType::Form)
        .body("username=valid_user&password=valid_password&location=/")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::SeeOther);

    // The transient page points at the finalizer
    let response = client
        .get("/logout?location=/")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let html = response.into_string().await.unwrap();
    assert!(html.contains("/logout/finalize"));

    // The finalizer kills the cookie and redirects
    let response = client
        .get("/logout/finalize?location=/")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::SeeOther);
    let set_cookie: Vec<&str> = response.headers().get("Set-Cookie").collect();
    assert!(set_cookie
        .iter()
        .any(|c| c.starts_with("uitsmijter-sso=invalid")));
}

/// Percent-encode a query value.
fn pct(value: &str) -> String {
    serde_urlencoded::to_string([("q", value)])
        .map(|s| s.trim_start_matches("q=").to_string())
        .unwrap_or_default()
}
