// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Client entity
//!
//! An OAuth client registered to exactly one tenant. The client carries the
//! redirect and referrer patterns the pipeline validates against, the grant
//! types it may use, its scope whitelist and an optional shared secret.

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::EntityRef;

/// OAuth grant types a client may exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow, with or without PKCE.
    AuthorizationCode,
    /// Refresh token exchange.
    RefreshToken,
    /// Resource owner password credentials.
    Password,
    /// Client credentials (service tokens).
    ClientCredentials,
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}

/// Declarative specification of a client, the `spec` of its document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSpec {
    /// Name of the owning tenant. Must resolve to a registered tenant at
    /// the moment the client is activated.
    #[serde(rename = "tenantname", alias = "tenant_name")]
    pub tenant_name: String,

    /// Ordered list of regular expressions a `redirect_uri` must full-match.
    #[serde(default)]
    pub redirect_urls: Vec<String>,

    /// Grant types this client may use. Defaults to authorization code
    /// plus refresh token.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,

    /// Scope whitelist. Requested scopes outside this list are silently
    /// discarded.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Regular expressions the `Referer` header must full-match when the
    /// client restricts referrers. Empty means no restriction.
    #[serde(default)]
    pub referrers: Vec<String>,

    /// Optional shared secret for confidential clients.
    #[serde(default)]
    pub secret: Option<String>,

    /// When `true`, plain authorization requests are rejected; the client
    /// must present a PKCE challenge.
    #[serde(default)]
    pub is_pkce_only: bool,
}

/// An OAuth client registered to one tenant.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client identifier, the `client_id` of the OAuth flows.
    pub id: Uuid,

    /// Document name, used in logs and status reports.
    pub name: String,

    /// Reference to the declarative source this client was loaded from.
    pub reference: EntityRef,

    /// The declarative specification.
    pub spec: ClientSpec,
}

/// Validation failures for redirect and referrer checks.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RedirectError {
    /// The candidate URL matched none of the registered patterns.
    #[error("redirect target not allowed for this client")]
    IllegalRedirect,

    /// The referrer matched none of the registered patterns.
    #[error("referrer not allowed for this client")]
    IllegalReferrer,
}

impl Client {
    /// Validate a redirect target against the registered patterns.
    ///
    /// A target that re-enters the authorization endpoint (`/authorize?…`)
    /// is always allowed; this is how the login page loops back after a
    /// successful form submission. Every other target must full-match at
    /// least one of the client's `redirect_urls` patterns, each treated as
    /// an anchored regular expression.
    ///
    /// # Returns
    ///
    /// The unchanged input on success, [`RedirectError::IllegalRedirect`]
    /// otherwise.
    pub fn checked_redirect<'a>(&self, url: &'a str) -> Result<&'a str, RedirectError> {
        if url.starts_with("/authorize?") {
            return Ok(url);
        }
        if self
            .spec
            .redirect_urls
            .iter()
            .any(|pattern| anchored_match(pattern, url))
        {
            Ok(url)
        } else {
            Err(RedirectError::IllegalRedirect)
        }
    }

    /// Whether this client restricts the `Referer` of authorization
    /// requests.
    pub fn has_referrer_restriction(&self) -> bool {
        !self.spec.referrers.is_empty()
    }

    /// Validate a `Referer` value against the registered patterns.
    pub fn checked_referrer<'a>(&self, referrer: &'a str) -> Result<&'a str, RedirectError> {
        if self
            .spec
            .referrers
            .iter()
            .any(|pattern| anchored_match(pattern, referrer))
        {
            Ok(referrer)
        } else {
            Err(RedirectError::IllegalReferrer)
        }
    }

    /// Intersect requested scopes with the client's whitelist.
    ///
    /// The result preserves the order of the request and drops duplicates.
    pub fn allowed_scopes(&self, requested: &[String]) -> Vec<String> {
        let mut granted = Vec::new();
        for scope in requested {
            if self.spec.scopes.iter().any(|s| s == scope) && !granted.contains(scope) {
                granted.push(scope.clone());
            }
        }
        granted
    }

    /// Whether the client may use the given grant type.
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.spec.grant_types.contains(&grant)
    }

    /// Verify a presented client secret.
    ///
    /// Clients without a configured secret accept any (absent) secret;
    /// clients with one require an exact match.
    pub fn verify_secret(&self, presented: Option<&str>) -> bool {
        match &self.spec.secret {
            None => true,
            Some(expected) => presented == Some(expected.as_str()),
        }
    }
}

/// Full-match a value against a pattern, anchoring it if necessary.
fn anchored_match(pattern: &str, value: &str) -> bool {
    let anchored = format!(
        "^{}$",
        pattern.trim_start_matches('^').trim_end_matches('$')
    );
    match Regex::new(&anchored) {
        Ok(re) => re.is_match(value),
        Err(err) => {
            log::warn!("Ignoring invalid pattern {:?}: {}", pattern, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_client(redirects: Vec<&str>, referrers: Vec<&str>) -> Client {
        Client {
            id: Uuid::new_v4(),
            name: "test-client".into(),
            reference: EntityRef::File {
                path: PathBuf::from("/tmp/client.yaml"),
            },
            spec: ClientSpec {
                tenant_name: "acme".into(),
                redirect_urls: redirects.into_iter().map(String::from).collect(),
                grant_types: default_grant_types(),
                scopes: vec!["read".into(), "write".into()],
                referrers: referrers.into_iter().map(String::from).collect(),
                secret: None,
                is_pkce_only: false,
            },
        }
    }

    #[test]
    fn redirect_patterns_are_anchored() {
        let client = test_client(vec![r"https://app\.example\.com/.*"], vec![]);
        assert!(client
            .checked_redirect("https://app.example.com/callback")
            .is_ok());
        // Prefixing the allowed host must not bypass the anchor
        assert_eq!(
            client.checked_redirect("https://evil.test/https://app.example.com/"),
            Err(RedirectError::IllegalRedirect)
        );
    }

    #[test]
    fn authorize_reentry_is_always_allowed() {
        let client = test_client(vec![], vec![]);
        assert!(client
            .checked_redirect("/authorize?client_id=abc&response_type=code")
            .is_ok());
        assert!(client.checked_redirect("/somewhere-else").is_err());
    }

    #[test]
    fn referrer_validation() {
        let client = test_client(vec![], vec![r"https://portal\.example\.com/.*"]);
        assert!(client.has_referrer_restriction());
        assert!(client
            .checked_referrer("https://portal.example.com/login")
            .is_ok());
        assert_eq!(
            client.checked_referrer("https://elsewhere.example.com/"),
            Err(RedirectError::IllegalReferrer)
        );
    }

    #[test]
    fn scope_intersection_preserves_request_order() {
        let client = test_client(vec![], vec![]);
        let granted = client.allowed_scopes(&[
            "write".to_string(),
            "admin".to_string(),
            "read".to_string(),
            "write".to_string(),
        ]);
        assert_eq!(granted, vec!["write".to_string(), "read".to_string()]);
    }

    #[test]
    fn secret_verification() {
        let mut client = test_client(vec![], vec![]);
        assert!(client.verify_secret(None));
        client.spec.secret = Some("s3cret".into());
        assert!(client.verify_secret(Some("s3cret")));
        assert!(!client.verify_secret(Some("wrong")));
        assert!(!client.verify_secret(None));
    }
}
