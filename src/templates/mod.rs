// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-tenant page templates
//!
//! Each tenant may ship its own `index`, `login`, `logout` and `error`
//! pages. When a tenant with a template descriptor is added, the loader
//! fetches the four assets from the descriptor's object-store location,
//! writes them below `<view_root>/<tenant_slug>/` (replacing existing
//! files atomically) and registers them with the handlebars registry.
//! When the tenant is removed, its slug directory and registrations are
//! dropped again.
//!
//! Rendering resolves templates with a fallback chain:
//! `<slug>/<page>` → `<slug>/index` → `default/<page>` → `default/index`.
//! The default pages are embedded in the binary.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use include_dir::{include_dir, Dir};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::domain::{EntityChange, Tenant, TemplateSource};

/// Embedded default templates.
static DEFAULT_TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/resources/templates/default");

/// The fixed set of per-tenant template assets.
pub const PAGES: [&str; 4] = ["index", "login", "logout", "error"];

/// Thread-safe handlebars registry with tenant fallback resolution.
pub struct TemplateRegistry {
    registry: Mutex<Handlebars<'static>>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    /// Create a registry preloaded with the embedded default pages.
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        for file in DEFAULT_TEMPLATES.files() {
            let Some(stem) = file.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(source) = file.contents_utf8() else {
                continue;
            };
            let name = format!("default/{}", stem);
            registry
                .register_template_string(&name, source)
                .unwrap_or_else(|err| panic!("Embedded template {} is invalid: {}", name, err));
        }
        Self {
            registry: Mutex::new(registry),
        }
    }

    /// Register one tenant template.
    pub fn register(&self, slug: &str, page: &str, source: &str) -> Result<()> {
        let name = format!("{}/{}", slug, page);
        self.registry
            .lock()
            .unwrap()
            .register_template_string(&name, source)
            .with_context(|| format!("Template {} does not compile", name))
    }

    /// Drop all templates of a tenant.
    pub fn unregister(&self, slug: &str) {
        let mut registry = self.registry.lock().unwrap();
        for page in PAGES {
            registry.unregister_template(&format!("{}/{}", slug, page));
        }
    }

    /// Resolve the template name for a tenant page along the fallback
    /// chain.
    pub fn resolve(&self, slug: Option<&str>, page: &str) -> String {
        let registry = self.registry.lock().unwrap();
        if let Some(slug) = slug {
            let direct = format!("{}/{}", slug, page);
            if registry.has_template(&direct) {
                return direct;
            }
            let index = format!("{}/index", slug);
            if registry.has_template(&index) {
                return index;
            }
        }
        let default = format!("default/{}", page);
        if registry.has_template(&default) {
            return default;
        }
        "default/index".to_string()
    }

    /// Render a tenant page with the fallback chain.
    pub fn render(
        &self,
        slug: Option<&str>,
        page: &str,
        data: &serde_json::Value,
    ) -> Result<String> {
        let name = self.resolve(slug, page);
        self.registry
            .lock()
            .unwrap()
            .render(&name, data)
            .with_context(|| format!("Rendering template {} failed", name))
    }
}

/// Fetches tenant template assets and keeps the registry in sync with
/// entity changes.
pub struct TemplateLoader {
    view_root: PathBuf,
    fetch_timeout: std::time::Duration,
    registry: Arc<TemplateRegistry>,
}

impl TemplateLoader {
    /// Create a loader writing below the given view root.
    pub fn new(
        view_root: impl Into<PathBuf>,
        fetch_timeout: std::time::Duration,
        registry: Arc<TemplateRegistry>,
    ) -> Self {
        Self {
            view_root: view_root.into(),
            fetch_timeout,
            registry,
        }
    }

    /// Bridge entity-store hooks into an mpsc channel the worker task
    /// consumes. Returns the sender to register on the store.
    pub fn channel() -> (
        mpsc::UnboundedSender<EntityChange>,
        mpsc::UnboundedReceiver<EntityChange>,
    ) {
        mpsc::unbounded_channel()
    }

    /// Worker loop: react to tenant additions and removals.
    pub async fn run(self, mut changes: mpsc::UnboundedReceiver<EntityChange>) {
        while let Some(change) = changes.recv().await {
            match change {
                EntityChange::TenantAdded(tenant) => {
                    if let Some(source) = tenant.spec.templates.clone() {
                        if let Err(err) = self.fetch_tenant_templates(&tenant, &source).await {
                            error!(
                                "Template fetch for tenant {} failed: {}",
                                tenant.name, err
                            );
                        }
                    }
                }
                EntityChange::TenantRemoved(tenant) => self.remove_tenant_templates(&tenant).await,
                _ => {}
            }
        }
    }

    /// Fetch the fixed asset set of a tenant and activate it.
    async fn fetch_tenant_templates(&self, tenant: &Tenant, source: &TemplateSource) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(self.fetch_timeout)
            .build()?;
        let tenant_dir = self.view_root.join(&tenant.name);
        tokio::fs::create_dir_all(&tenant_dir)
            .await
            .with_context(|| format!("Could not create template directory {:?}", tenant_dir))?;

        for page in PAGES {
            let url = format!("{}/{}.hbs", source.url.trim_end_matches('/'), page);
            let mut request = client.get(&url);
            if let Some(access_key) = &source.access_key {
                request = request.bearer_auth(access_key);
            }
            let response = match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => response,
                Err(err) => {
                    // A tenant may ship a subset; keep the fallback chain
                    // for the rest
                    warn!("Template {} for tenant {} not fetched: {}", page, tenant.name, err);
                    continue;
                }
            };
            let body = response.text().await?;

            // Compile before activating; a broken template must not
            // replace a working one
            if let Err(err) = self.registry.register(&tenant.name, page, &body) {
                warn!("{}", err);
                continue;
            }

            let target = tenant_dir.join(format!("{}.hbs", page));
            let tenant_dir = tenant_dir.clone();
            let written = tokio::task::spawn_blocking(move || -> Result<()> {
                let mut temp = tempfile::NamedTempFile::new_in(&tenant_dir)?;
                std::io::Write::write_all(&mut temp, body.as_bytes())?;
                temp.persist(&target)?;
                Ok(())
            })
            .await?;
            if let Err(err) = written {
                warn!(
                    "Template {} for tenant {} not persisted: {}",
                    page, tenant.name, err
                );
            }
        }
        info!("Templates for tenant {} activated", tenant.name);
        Ok(())
    }

    /// Remove a tenant's assets and registrations.
    async fn remove_tenant_templates(&self, tenant: &Tenant) {
        self.registry.unregister(&tenant.name);
        let tenant_dir = self.view_root.join(&tenant.name);
        match tokio::fs::remove_dir_all(&tenant_dir).await {
            Ok(()) => debug!("Removed template directory {:?}", tenant_dir),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("Could not remove {:?}: {}", tenant_dir, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_embedded() {
        let registry = TemplateRegistry::new();
        for page in PAGES {
            assert_eq!(registry.resolve(None, page), format!("default/{}", page));
        }
    }

    #[test]
    fn fallback_chain_prefers_tenant_templates() {
        let registry = TemplateRegistry::new();
        registry
            .register("acme", "login", "<h1>{{tenant}}</h1>")
            .unwrap();
        assert_eq!(registry.resolve(Some("acme"), "login"), "acme/login");
        // Pages the tenant does not override fall back to its index, or
        // to the defaults when there is none
        assert_eq!(registry.resolve(Some("acme"), "error"), "default/error");
        registry.register("acme", "index", "<h1>index</h1>").unwrap();
        assert_eq!(registry.resolve(Some("acme"), "error"), "acme/index");
    }

    #[test]
    fn unregister_restores_the_defaults() {
        let registry = TemplateRegistry::new();
        registry.register("acme", "login", "custom").unwrap();
        registry.unregister("acme");
        assert_eq!(registry.resolve(Some("acme"), "login"), "default/login");
    }

    #[test]
    fn rendering_uses_the_resolved_template() {
        let registry = TemplateRegistry::new();
        registry
            .register("acme", "login", "Welcome to {{tenant}}")
            .unwrap();
        let html = registry
            .render(Some("acme"), "login", &json!({"tenant": "acme"}))
            .unwrap();
        assert_eq!(html, "Welcome to acme");
    }

    #[test]
    fn broken_templates_do_not_register() {
        let registry = TemplateRegistry::new();
        assert!(registry.register("acme", "login", "{{#if}}").is_err());
        assert_eq!(registry.resolve(Some("acme"), "login"), "default/login");
    }
}
