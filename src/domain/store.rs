// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process-wide entity registry
//!
//! The [`EntityStore`] holds the live set of tenants and clients. The
//! loaders are the only writers; request handlers resolve tenants by host
//! and clients by id against a point-in-time snapshot. Change hooks fire
//! after a mutation is visible, so subscribers (counters, the template
//! loader) never observe an entity that is not yet resolvable.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use uuid::Uuid;

use super::client::Client;
use super::hosts;
use super::tenant::{EntityRef, Tenant};

/// A change published by the entity store after it became visible.
#[derive(Debug, Clone)]
pub enum EntityChange {
    /// A tenant was inserted.
    TenantAdded(Arc<Tenant>),
    /// A tenant was removed. Its clients are orphaned, not removed.
    TenantRemoved(Arc<Tenant>),
    /// A client was inserted.
    ClientAdded(Arc<Client>),
    /// A client was removed.
    ClientRemoved(Arc<Client>),
}

/// Either kind of registered entity, as returned by reference lookups.
#[derive(Debug, Clone)]
pub enum Entity {
    Tenant(Arc<Tenant>),
    Client(Arc<Client>),
}

/// Errors raised by store mutations.
#[derive(Debug, thiserror::Error)]
pub enum EntityStoreError {
    /// One of the inserted tenant's hosts already belongs to another
    /// tenant. The whole insert is rejected.
    #[error("host {host} already belongs to tenant {tenant}")]
    HostTaken { host: String, tenant: String },

    /// The client references a tenant that is not registered.
    #[error("client references unknown tenant {0}")]
    UnknownTenant(String),

    /// A different client with the same id is already registered.
    #[error("client id {0} already registered")]
    DuplicateClient(Uuid),
}

type ChangeHook = Box<dyn Fn(&EntityChange) + Send + Sync>;

#[derive(Default)]
struct Inner {
    tenants: HashMap<String, Arc<Tenant>>,
    clients: Vec<Arc<Client>>,
}

/// Thread-safe registry of tenants and clients.
///
/// A single `RwLock` guards both collections: the loader thread is the
/// only writer, request handlers take read locks. Hooks are invoked
/// outside the write lock, after the mutation is visible.
#[derive(Default)]
pub struct EntityStore {
    inner: RwLock<Inner>,
    hooks: RwLock<Vec<ChangeHook>>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a change hook. Hooks run synchronously on the mutating
    /// thread; long-running subscribers should hand the change off to a
    /// channel.
    pub fn subscribe<F>(&self, hook: F)
    where
        F: Fn(&EntityChange) + Send + Sync + 'static,
    {
        self.hooks.write().unwrap().push(Box::new(hook));
    }

    fn publish(&self, change: EntityChange) {
        for hook in self.hooks.read().unwrap().iter() {
            hook(&change);
        }
    }

    /// Insert a tenant.
    ///
    /// The insert is rejected as a whole when any of the tenant's hosts
    /// already belongs to a different tenant. A tenant with an equal
    /// source reference is replaced (remove + add).
    pub fn insert_tenant(&self, tenant: Tenant) -> Result<(), EntityStoreError> {
        let mut removed = None;
        let added;
        {
            let mut inner = self.inner.write().unwrap();

            // Host uniqueness across all other tenants
            for host in &tenant.spec.hosts {
                for existing in inner.tenants.values() {
                    if existing.reference == tenant.reference || existing.name == tenant.name {
                        continue;
                    }
                    if existing.spec.hosts.iter().any(|h| h == host) {
                        return Err(EntityStoreError::HostTaken {
                            host: host.clone(),
                            tenant: existing.name.clone(),
                        });
                    }
                }
            }

            // Replace any previous version loaded from the same source,
            // or carrying the same unique name
            if let Some(previous) = inner
                .tenants
                .values()
                .find(|t| t.reference == tenant.reference || t.name == tenant.name)
                .cloned()
            {
                inner.tenants.remove(&previous.name);
                removed = Some(previous);
            }

            let tenant = Arc::new(tenant);
            inner.tenants.insert(tenant.name.clone(), tenant.clone());
            added = tenant;
        }

        if let Some(previous) = removed {
            debug!("Replacing tenant {}", previous.name);
            self.publish(EntityChange::TenantRemoved(previous));
        }
        info!("Tenant {} activated", added.name);
        self.publish(EntityChange::TenantAdded(added));
        Ok(())
    }

    /// Remove a tenant by name. Registered clients of the tenant are
    /// orphaned, not removed.
    pub fn remove_tenant(&self, name: &str) -> Option<Arc<Tenant>> {
        let removed = self.inner.write().unwrap().tenants.remove(name);
        if let Some(tenant) = &removed {
            info!("Tenant {} removed", tenant.name);
            self.publish(EntityChange::TenantRemoved(tenant.clone()));
        }
        removed
    }

    /// Insert a client. Its tenant must already be registered.
    pub fn insert_client(&self, client: Client) -> Result<(), EntityStoreError> {
        let mut removed = None;
        let added;
        {
            let mut inner = self.inner.write().unwrap();

            if !inner.tenants.contains_key(&client.spec.tenant_name) {
                return Err(EntityStoreError::UnknownTenant(
                    client.spec.tenant_name.clone(),
                ));
            }

            // Another source owning the same id is a conflict; the same
            // reference is a replacement
            if inner
                .clients
                .iter()
                .any(|c| c.id == client.id && c.reference != client.reference)
            {
                return Err(EntityStoreError::DuplicateClient(client.id));
            }
            if let Some(pos) = inner
                .clients
                .iter()
                .position(|c| c.reference == client.reference)
            {
                removed = Some(inner.clients.remove(pos));
            }

            let client = Arc::new(client);
            inner.clients.push(client.clone());
            added = client;
        }

        if let Some(previous) = removed {
            debug!("Replacing client {}", previous.id);
            self.publish(EntityChange::ClientRemoved(previous));
        }
        info!("Client {} ({}) activated", added.name, added.id);
        self.publish(EntityChange::ClientAdded(added));
        Ok(())
    }

    /// Remove a client by id.
    pub fn remove_client(&self, id: &Uuid) -> Option<Arc<Client>> {
        let removed = {
            let mut inner = self.inner.write().unwrap();
            inner
                .clients
                .iter()
                .position(|c| c.id == *id)
                .map(|pos| inner.clients.remove(pos))
        };
        if let Some(client) = &removed {
            info!("Client {} removed", client.id);
            self.publish(EntityChange::ClientRemoved(client.clone()));
        }
        removed
    }

    /// Look up a tenant by name.
    pub fn tenant(&self, name: &str) -> Option<Arc<Tenant>> {
        self.inner.read().unwrap().tenants.get(name).cloned()
    }

    /// Look up a client by its UUID string, case-insensitively.
    pub fn client(&self, id: &str) -> Option<Arc<Client>> {
        let id = Uuid::parse_str(id.trim()).ok()?;
        self.inner
            .read()
            .unwrap()
            .clients
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Resolve the tenant responsible for a host.
    ///
    /// An exact host entry wins over a wildcard entry; wildcard entries
    /// are tried across every tenant only when no exact match exists.
    pub fn tenant_for_host(&self, host: &str) -> Option<Arc<Tenant>> {
        let inner = self.inner.read().unwrap();

        for tenant in inner.tenants.values() {
            if tenant
                .spec
                .hosts
                .iter()
                .any(|h| !hosts::is_wildcard(h) && h.eq_ignore_ascii_case(host))
            {
                return Some(tenant.clone());
            }
        }
        for tenant in inner.tenants.values() {
            if tenant
                .spec
                .hosts
                .iter()
                .any(|h| hosts::is_wildcard(h) && hosts::host_matches(h, host))
            {
                return Some(tenant.clone());
            }
        }
        None
    }

    /// Clients registered to a tenant.
    pub fn clients_of(&self, tenant_name: &str) -> Vec<Arc<Client>> {
        self.inner
            .read()
            .unwrap()
            .clients
            .iter()
            .filter(|c| c.spec.tenant_name == tenant_name)
            .cloned()
            .collect()
    }

    /// Look up an entity by its source reference.
    pub fn find_by_reference(&self, reference: &EntityRef) -> Option<Entity> {
        let inner = self.inner.read().unwrap();
        if let Some(tenant) = inner.tenants.values().find(|t| t.reference == *reference) {
            return Some(Entity::Tenant(tenant.clone()));
        }
        inner
            .clients
            .iter()
            .find(|c| c.reference == *reference)
            .map(|c| Entity::Client(c.clone()))
    }

    /// Remove whichever entity carries the given source reference.
    pub fn remove_by_reference(&self, reference: &EntityRef) -> Option<Entity> {
        match self.find_by_reference(reference)? {
            Entity::Tenant(tenant) => self.remove_tenant(&tenant.name).map(Entity::Tenant),
            Entity::Client(client) => self.remove_client(&client.id).map(Entity::Client),
        }
    }

    /// Snapshot of all registered tenants.
    pub fn tenants(&self) -> Vec<Arc<Tenant>> {
        self.inner.read().unwrap().tenants.values().cloned().collect()
    }

    /// Number of registered tenants.
    pub fn tenant_count(&self) -> usize {
        self.inner.read().unwrap().tenants.len()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.inner.read().unwrap().clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::ClientSpec;
    use crate::domain::tenant::TenantSpec;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tenant(name: &str, hosts: Vec<&str>, path: &str) -> Tenant {
        Tenant {
            name: name.into(),
            reference: EntityRef::File {
                path: PathBuf::from(path),
            },
            spec: TenantSpec {
                hosts: hosts.into_iter().map(String::from).collect(),
                interceptor: None,
                silent_login: true,
                provider_scripts: vec![],
                templates: None,
                informations: None,
            },
        }
    }

    fn client(tenant_name: &str, path: &str) -> Client {
        Client {
            id: Uuid::new_v4(),
            name: "client".into(),
            reference: EntityRef::File {
                path: PathBuf::from(path),
            },
            spec: ClientSpec {
                tenant_name: tenant_name.into(),
                redirect_urls: vec![".*".into()],
                grant_types: vec![GrantType::AuthorizationCode],
                scopes: vec![],
                referrers: vec![],
                secret: None,
                is_pkce_only: false,
            },
        }
    }

    use crate::domain::client::GrantType;

    #[test]
    fn rejects_host_collisions_entirely() {
        let store = EntityStore::new();
        store
            .insert_tenant(tenant("one", vec!["a.test"], "/t/one.yaml"))
            .unwrap();
        let err = store
            .insert_tenant(tenant("two", vec!["b.test", "a.test"], "/t/two.yaml"))
            .unwrap_err();
        assert!(matches!(err, EntityStoreError::HostTaken { .. }));
        // Nothing of the rejected tenant must be visible
        assert!(store.tenant("two").is_none());
        assert!(store.tenant_for_host("b.test").is_none());
    }

    #[test]
    fn exact_host_wins_over_wildcard() {
        let store = EntityStore::new();
        store
            .insert_tenant(tenant("wild", vec!["*.example.test"], "/t/wild.yaml"))
            .unwrap();
        store
            .insert_tenant(tenant("exact", vec!["login.example.test"], "/t/exact.yaml"))
            .unwrap();
        assert_eq!(
            store.tenant_for_host("login.example.test").unwrap().name,
            "exact"
        );
        assert_eq!(
            store.tenant_for_host("other.example.test").unwrap().name,
            "wild"
        );
    }

    #[test]
    fn client_requires_registered_tenant() {
        let store = EntityStore::new();
        let err = store.insert_client(client("ghost", "/c/one.yaml")).unwrap_err();
        assert!(matches!(err, EntityStoreError::UnknownTenant(_)));
    }

    #[test]
    fn removing_tenant_orphans_clients() {
        let store = EntityStore::new();
        store
            .insert_tenant(tenant("acme", vec!["acme.test"], "/t/acme.yaml"))
            .unwrap();
        store.insert_client(client("acme", "/c/app.yaml")).unwrap();
        store.remove_tenant("acme");
        assert_eq!(store.tenant_count(), 0);
        assert_eq!(store.client_count(), 1);
    }

    #[test]
    fn same_reference_replaces() {
        let store = EntityStore::new();
        store
            .insert_tenant(tenant("acme", vec!["acme.test"], "/t/acme.yaml"))
            .unwrap();
        store
            .insert_tenant(tenant("acme", vec!["acme.test", "www.acme.test"], "/t/acme.yaml"))
            .unwrap();
        assert_eq!(store.tenant_count(), 1);
        assert!(store.tenant_for_host("www.acme.test").is_some());
    }

    #[test]
    fn hooks_fire_after_visibility() {
        let store = Arc::new(EntityStore::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let store_in_hook = store.clone();
        let seen_in_hook = seen.clone();
        store.subscribe(move |change| {
            if let EntityChange::TenantAdded(tenant) = change {
                // The tenant must be resolvable at hook time
                assert!(store_in_hook.tenant(&tenant.name).is_some());
                seen_in_hook.fetch_add(1, Ordering::SeqCst);
            }
        });
        store
            .insert_tenant(tenant("acme", vec!["acme.test"], "/t/acme.yaml"))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn case_insensitive_client_lookup() {
        let store = EntityStore::new();
        store
            .insert_tenant(tenant("acme", vec!["acme.test"], "/t/acme.yaml"))
            .unwrap();
        let c = client("acme", "/c/app.yaml");
        let id = c.id;
        store.insert_client(c).unwrap();
        let upper = id.to_string().to_uppercase();
        assert!(store.client(&upper).is_some());
    }
}
