// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration test for OpenID Connect discovery and JWKS
//!
//! The discovery document is tenant-aware: scopes and grant types are
//! the sorted, duplicate-free union over the tenant's clients plus the
//! base sets every tenant supports. The JWKS endpoint never publishes an
//! empty set; an empty ring generates its first key on demand.

use rocket::http::{Header, Status};
use rocket::local::asynchronous::Client;
use rust_authgate::config::Config;
use rust_authgate::domain::client::ClientSpec;
use rust_authgate::domain::tenant::{TenantInformations, TenantSpec};
use rust_authgate::domain::{Client as OAuthClient, EntityRef, GrantType, Tenant};
use rust_authgate::server::{build_rocket, AppState};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

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
                provider_scripts: vec![],
                templates: None,
                informations: Some(TenantInformations {
                    imprint_url: Some("https://acme.example.com/imprint".into()),
                    privacy_url: Some("https://acme.example.com/privacy".into()),
                    register_url: None,
                }),
            },
        })
        .unwrap();

    let clients = [
        ("1de56a4b-59a0-4b92-9e2f-5d4e2e2c32a1", vec!["read", "write"], vec![GrantType::AuthorizationCode, GrantType::RefreshToken]),
        ("3b1464c8-8a1d-4d5f-9d38-2f8a25c9e0b7", vec!["read", "admin"], vec![GrantType::Password]),
    ];
    for (id, scopes, grants) in clients {
        state
            .store
            .insert_client(OAuthClient {
                id: Uuid::parse_str(id).unwrap(),
                name: format!("client-{}", &id[..8]),
                reference: EntityRef::File {
                    path: PathBuf::from(format!("/c/{}.yaml", id)),
                },
                spec: ClientSpec {
                    tenant_name: "acme".into(),
                    redirect_urls: vec![".*".into()],
                    grant_types: grants,
                    scopes: scopes.into_iter().map(String::from).collect(),
                    referrers: vec![],
                    secret: None,
                    is_pkce_only: false,
                },
            })
            .unwrap();
    }
}

async fn test_client() -> Client {
    let mut config = Config::default();
    config.jwt.secret = Some("test-hmac-secret-key-for-testing".to_string());
    let state = AppState::from_config(config);
    seed(&state);
    Client::untracked(build_rocket(state)).await.expect("valid rocket instance")
}

#[rocket::async_test]
async fn test_openid_configuration_document() {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = test_client().await;

    let response = client
        .get("/.well-known/openid-configuration")
        .header(Header::new("X-Forwarded-Host", "example.com"))
        .header(Header::new("X-Forwarded-Proto", "https"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response
        .headers()
        .get_one("Cache-Control")
        .unwrap()
        .contains("max-age=3600"));

    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["issuer"], "https://example.com");
    assert_eq!(
        body["authorization_endpoint"],
        "https://example.com/authorize"
    );
    assert_eq!(body["token_endpoint"], "https://example.com/token");
    assert_eq!(
        body["jwks_uri"],
        "https://example.com/.well-known/jwks.json"
    );
    assert_eq!(body["response_types_supported"], serde_json::json!(["code"]));
    assert_eq!(body["subject_types_supported"], serde_json::json!(["public"]));
    assert_eq!(
        body["id_token_signing_alg_values_supported"],
        serde_json::json!(["RS256"])
    );
    assert_eq!(
        body["code_challenge_methods_supported"],
        serde_json::json!(["S256", "plain"])
    );
    assert_eq!(body["op_policy_uri"], "https://acme.example.com/privacy");
    assert_eq!(
        body["service_documentation"],
        "https://acme.example.com/imprint"
    );

    // Scopes: union over clients plus the OpenID base set, sorted and
    // duplicate free
    let scopes: Vec<String> = body["scopes_supported"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    for expected in ["openid", "profile", "email", "read", "write", "admin"] {
        assert!(scopes.contains(&expected.to_string()), "missing {}", expected);
    }
    let mut sorted = scopes.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(scopes, sorted);

    // Grant types: union plus the defaults, sorted
    let grants: Vec<String> = body["grant_types_supported"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        grants,
        vec!["authorization_code", "password", "refresh_token"]
    );
}

#[rocket::async_test]
async fn test_unknown_host_is_a_bad_request() {
    let client = test_client().await;
    let response = client
        .get("/.well-known/openid-configuration")
        .header(Header::new("X-Forwarded-Host", "nobody.test"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn test_jwks_generates_a_key_on_demand() {
    let client = test_client().await;

    let response = client.get("/.well-known/jwks.json").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response
        .headers()
        .get_one("Cache-Control")
        .unwrap()
        .contains("max-age=3600"));

    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "RSA");
    assert_eq!(keys[0]["alg"], "RS256");
    assert_eq!(keys[0]["use"], "sig");
    assert!(keys[0]["kid"].as_str().is_some());

    // Rotation adds a key; both stay published for verification
    let state = client.rocket().state::<AppState>().unwrap();
    state.signer.key_ring().rotate("2031-01-01").unwrap();
    let response = client.get("/.well-known/jwks.json").dispatch().await;
    let body: Value =
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["keys"].as_array().unwrap().len(), 2);
}

#[rocket::async_test]
async fn test_health_and_metrics_surface() {
    let client = test_client().await;

    let response = client.get("/health").dispatch().await;
    assert_eq!(response.status(), Status::NoContent);

    let response = client.get("/health/ready").dispatch().await;
    assert_eq!(response.status(), Status::NoContent);

    let response = client.get("/metrics").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let text = response.into_string().await.unwrap();
    assert!(text.contains("authgate_login_attempts"));
    assert!(text.contains("authgate_tenants_count 1"));
    assert!(text.contains("authgate_clients_count 2"));

    let response = client.get("/versions").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
}
