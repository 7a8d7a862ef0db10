// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Browser session cookie
//!
//! The SSO cookie carries the same JWT used as an API bearer. In OAuth
//! mode the cookie is host-scoped (no `Domain` attribute); in interceptor
//! mode it is scoped to the tenant's configured cookie domain so every
//! protected service behind the proxy shares the session.
//!
//! The [`TokenCookieBridge`] fairing copies the cookie value into the
//! request's `Authorization: Bearer` header when that header is absent,
//! so every downstream guard only ever looks at the header.

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Cookie, Header, SameSite};
use rocket::{Data, Request};
use rocket::time::OffsetDateTime;

/// Build the SSO session cookie.
///
/// Attributes per the session design: `HttpOnly`, `SameSite=Strict`,
/// `Path=/`, `Secure` from configuration, `Domain` only in interceptor
/// mode.
pub fn session_cookie(
    name: &str,
    token: String,
    secure: bool,
    domain: Option<String>,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_string(), token);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    if let Some(domain) = domain {
        cookie.set_domain(domain);
    }
    cookie
}

/// Build the cookie that kills an existing session.
///
/// Same scope as the session cookie, content `"invalid"`, expiry in the
/// past so the browser discards it immediately.
pub fn killed_cookie(name: &str, secure: bool, domain: Option<String>) -> Cookie<'static> {
    let mut cookie = session_cookie(name, "invalid".to_string(), secure, domain);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

/// Fairing bridging the session cookie into the `Authorization` header.
pub struct TokenCookieBridge {
    cookie_name: String,
}

impl TokenCookieBridge {
    /// Create a bridge for the configured cookie name.
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

#[rocket::async_trait]
impl Fairing for TokenCookieBridge {
    fn info(&self) -> Info {
        Info {
            name: "Session cookie to Authorization header bridge",
            kind: Kind::Request,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut Data<'_>) {
        if request.headers().get_one("Authorization").is_some() {
            return;
        }
        let token = request
            .cookies()
            .get(&self.cookie_name)
            .map(|cookie| cookie.value().to_string());
        if let Some(token) = token {
            if token != "invalid" && !token.is_empty() {
                request.add_header(Header::new("Authorization", format!("Bearer {}", token)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("uitsmijter-sso", "tok".into(), true, None);
        assert_eq!(cookie.name(), "uitsmijter-sso");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), None);
    }

    #[test]
    fn interceptor_cookie_carries_the_domain() {
        let cookie = session_cookie("uitsmijter-sso", "tok".into(), false, Some(".t.test".into()));
        assert_eq!(cookie.domain(), Some(".t.test"));
    }

    #[test]
    fn killed_cookie_expires_in_the_past() {
        let cookie = killed_cookie("uitsmijter-sso", false, None);
        assert_eq!(cookie.value(), "invalid");
        assert!(cookie.expires_datetime().unwrap() < OffsetDateTime::now_utc());
    }
}
