// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tenant entity
//!
//! A tenant is the unit of isolation of the server: it owns an ordered set
//! of hosts (literal domains or `*.x.y` wildcard patterns), carries the
//! provider scripts that decide who may log in, and optionally configures
//! forward-auth interception and custom page templates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reference to the declarative source a tenant or client was loaded from.
///
/// Two file references are equal iff their absolute paths match. Two
/// control-plane references are equal iff their UIDs match and either
/// revision is unknown or both revisions are equal. A file reference is
/// never equal to a control-plane reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EntityRef {
    /// Document read from the watched configuration directory.
    File {
        /// Absolute path of the YAML document.
        path: PathBuf,
    },
    /// Custom resource received from the cluster control plane.
    ControlPlane {
        /// Stable object UID assigned by the control plane.
        uid: String,
        /// Resource revision at receive time, when known.
        revision: Option<String>,
    },
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EntityRef::File { path: a }, EntityRef::File { path: b }) => a == b,
            (
                EntityRef::ControlPlane {
                    uid: ua,
                    revision: ra,
                },
                EntityRef::ControlPlane {
                    uid: ub,
                    revision: rb,
                },
            ) => ua == ub && (ra.is_none() || rb.is_none() || ra == rb),
            _ => false,
        }
    }
}

impl Eq for EntityRef {}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::File { path } => write!(f, "file:{}", path.display()),
            EntityRef::ControlPlane { uid, revision } => match revision {
                Some(rev) => write!(f, "crd:{}@{}", uid, rev),
                None => write!(f, "crd:{}", uid),
            },
        }
    }
}

/// Forward-auth settings of a tenant.
///
/// When `enabled`, the `/interceptor` endpoint answers forward-auth queries
/// for this tenant's hosts: `domain` is the login host unauthenticated
/// users are redirected to, `cookie` the domain scope of the SSO cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterceptorSettings {
    /// Answer forward-auth queries for this tenant.
    #[serde(default)]
    pub enabled: bool,

    /// Login host unauthenticated requests are redirected to.
    #[serde(default)]
    pub domain: Option<String>,

    /// Domain attribute of the SSO cookie, typically a parent domain
    /// shared by the protected services (e.g. `.example.com`).
    #[serde(default)]
    pub cookie: Option<String>,
}

/// Object-store location of a tenant's template assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSource {
    /// Base URL under which `index.hbs`, `login.hbs`, `logout.hbs` and
    /// `error.hbs` are published.
    pub url: String,

    /// Optional access key sent as a bearer credential.
    #[serde(default)]
    pub access_key: Option<String>,
}

/// Optional legal/self-service links rendered into the login pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantInformations {
    /// Imprint page of the tenant.
    #[serde(default)]
    pub imprint_url: Option<String>,

    /// Privacy policy page, also published in the discovery document.
    #[serde(default)]
    pub privacy_url: Option<String>,

    /// Account self-registration page.
    #[serde(default)]
    pub register_url: Option<String>,
}

/// Declarative specification of a tenant, the `spec` of its document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSpec {
    /// Ordered list of hosts this tenant answers for. Entries are literal
    /// domains or wildcard patterns of the form `*.x.y`. A host belongs to
    /// at most one tenant.
    pub hosts: Vec<String>,

    /// Forward-auth settings.
    #[serde(default)]
    pub interceptor: Option<InterceptorSettings>,

    /// When `true` (default) a valid existing session satisfies
    /// `/authorize` without a fresh form submission.
    #[serde(default = "default_silent_login")]
    pub silent_login: bool,

    /// Verbatim provider script sources, evaluated in order. Classified by
    /// the class names they declare.
    #[serde(default)]
    pub provider_scripts: Vec<String>,

    /// Object-store location of custom page templates.
    #[serde(default)]
    pub templates: Option<TemplateSource>,

    /// Legal/self-service links.
    #[serde(default)]
    pub informations: Option<TenantInformations>,
}

fn default_silent_login() -> bool {
    true
}

/// A tenant: the unit of isolation of the authorization server.
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Unique tenant name, a valid slug.
    pub name: String,

    /// Reference to the declarative source this tenant was loaded from.
    pub reference: EntityRef,

    /// The declarative specification.
    pub spec: TenantSpec,
}

impl Tenant {
    /// Create a tenant from its document parts, validating the name.
    pub fn new(name: impl Into<String>, reference: EntityRef, spec: TenantSpec) -> Option<Self> {
        let name = name.into();
        if !is_valid_slug(&name) {
            return None;
        }
        Some(Self {
            name,
            reference,
            spec,
        })
    }

    /// Silent-login flag, defaulting to `true`.
    pub fn silent_login(&self) -> bool {
        self.spec.silent_login
    }

    /// Whether forward-auth interception is enabled for this tenant.
    pub fn interceptor_enabled(&self) -> bool {
        self.spec
            .interceptor
            .as_ref()
            .map(|i| i.enabled)
            .unwrap_or(false)
    }

    /// The login host unauthenticated interceptor requests are sent to.
    pub fn interceptor_login_domain(&self) -> Option<&str> {
        self.spec
            .interceptor
            .as_ref()
            .and_then(|i| i.domain.as_deref())
    }

    /// The cookie domain used in interceptor mode.
    pub fn interceptor_cookie_domain(&self) -> Option<&str> {
        self.spec
            .interceptor
            .as_ref()
            .and_then(|i| i.cookie.as_deref())
    }
}

/// Check that a tenant name is a valid slug.
///
/// A slug is non-empty, lowercase alphanumeric with `-` or `_` separators,
/// and starts with an alphanumeric character. Slugs double as directory
/// names under the template view root.
pub fn is_valid_slug(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn slug_validation() {
        assert!(is_valid_slug("acme"));
        assert!(is_valid_slug("acme-corp_2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Acme"));
        assert!(!is_valid_slug("-acme"));
        assert!(!is_valid_slug("acme corp"));
    }

    #[test]
    fn file_references_compare_by_path() {
        let a = EntityRef::File {
            path: PathBuf::from("/etc/tenants/acme.yaml"),
        };
        let b = EntityRef::File {
            path: PathBuf::from("/etc/tenants/acme.yaml"),
        };
        let c = EntityRef::File {
            path: PathBuf::from("/etc/tenants/other.yaml"),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn control_plane_references_tolerate_unknown_revision() {
        let pinned = EntityRef::ControlPlane {
            uid: "123".into(),
            revision: Some("7".into()),
        };
        let unpinned = EntityRef::ControlPlane {
            uid: "123".into(),
            revision: None,
        };
        let newer = EntityRef::ControlPlane {
            uid: "123".into(),
            revision: Some("8".into()),
        };
        assert_eq!(pinned, unpinned);
        assert_ne!(pinned, newer);
    }

    #[test]
    fn source_kinds_never_compare_equal() {
        let file = EntityRef::File {
            path: PathBuf::from("/etc/tenants/acme.yaml"),
        };
        let crd = EntityRef::ControlPlane {
            uid: "123".into(),
            revision: None,
        };
        assert_ne!(file, crd);
    }
}
