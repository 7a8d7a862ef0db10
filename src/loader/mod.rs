// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Declarative entity loading
//!
//! Two sources feed the entity store: a watched configuration directory
//! ([`file_source::FileSource`]) and a cluster control-plane stream
//! ([`control_plane::ControlPlaneSource`]). Both emit the same
//! [`SourceEvent`]s, and the [`EntityLoader`] applies them idempotently:
//!
//! - a document whose reference is already known replaces the previous
//!   version, otherwise it is inserted;
//! - tenants apply before the clients that reference them; a client whose
//!   tenant is missing is held pending and retried in arrival order
//!   whenever any tenant is added;
//! - a deleted reference removes whichever entity carried it.
//!
//! A malformed document is logged and skipped; the previous version stays
//! live. A tenant whose hosts collide with another tenant's is rejected
//! without removing anything.

pub mod control_plane;
pub mod document;
pub mod file_source;

use log::{info, warn};
use std::sync::{Arc, Mutex};

use crate::domain::{Client, EntityRef, EntityStore, EntityStoreError};
use document::{DocumentError, EntityDocument, ParsedEntity};

pub use control_plane::ControlPlaneSource;
pub use file_source::FileSource;

/// A change emitted by a declarative source.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A new document appeared.
    Added(EntityRef, String),
    /// A known document changed.
    Modified(EntityRef, String),
    /// A document disappeared.
    Deleted(EntityRef),
}

/// Applies source events to the entity store.
pub struct EntityLoader {
    store: Arc<EntityStore>,
    /// Clients whose tenant was missing at apply time, in arrival order.
    pending: Mutex<Vec<Client>>,
}

impl EntityLoader {
    /// Create a loader writing into the given store.
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Number of clients waiting for their tenant.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Apply one source event.
    pub fn handle_event(&self, event: SourceEvent) {
        match event {
            SourceEvent::Added(reference, raw) | SourceEvent::Modified(reference, raw) => {
                self.apply_document(reference, &raw)
            }
            SourceEvent::Deleted(reference) => self.remove_reference(&reference),
        }
    }

    fn apply_document(&self, reference: EntityRef, raw: &str) {
        let entity = match Self::parse(reference.clone(), raw) {
            Ok(entity) => entity,
            Err(err) => {
                // The previous version, if any, stays live
                warn!("Skipping malformed document {}: {}", reference, err);
                return;
            }
        };

        match entity {
            ParsedEntity::Tenant(tenant) => {
                let name = tenant.name.clone();
                match self.store.insert_tenant(tenant) {
                    Ok(()) => self.retry_pending(),
                    Err(err @ EntityStoreError::HostTaken { .. }) => {
                        warn!("Rejecting tenant {}: {}", name, err);
                    }
                    Err(err) => warn!("Could not apply tenant {}: {}", name, err),
                }
            }
            ParsedEntity::Client(client) => self.apply_client(client),
        }
    }

    fn apply_client(&self, client: Client) {
        match self.store.insert_client(client.clone()) {
            Ok(()) => {}
            Err(EntityStoreError::UnknownTenant(tenant)) => {
                // Hold the orphan until its tenant arrives; the latest
                // document for a reference wins
                let mut pending = self.pending.lock().unwrap();
                pending.retain(|p| p.reference != client.reference);
                pending.push(client);
                info!("Client held pending, tenant {} not registered yet", tenant);
            }
            Err(err) => warn!("Could not apply client: {}", err),
        }
    }

    fn retry_pending(&self) {
        let waiting: Vec<Client> = {
            let mut pending = self.pending.lock().unwrap();
            std::mem::take(&mut *pending)
        };
        if waiting.is_empty() {
            return;
        }

        let mut still_pending = Vec::new();
        for client in waiting {
            match self.store.insert_client(client.clone()) {
                Ok(()) => info!("Pending client {} applied", client.id),
                Err(EntityStoreError::UnknownTenant(_)) => still_pending.push(client),
                Err(err) => warn!("Dropping pending client {}: {}", client.id, err),
            }
        }

        // Preserve arrival order for the next retry round
        let mut pending = self.pending.lock().unwrap();
        let mut merged = still_pending;
        merged.append(&mut *pending);
        *pending = merged;
    }

    fn remove_reference(&self, reference: &EntityRef) {
        self.pending
            .lock()
            .unwrap()
            .retain(|client| client.reference != *reference);
        if self.store.remove_by_reference(reference).is_none() {
            info!("Delete for unknown reference {}", reference);
        }
    }

    fn parse(reference: EntityRef, raw: &str) -> Result<ParsedEntity, DocumentError> {
        EntityDocument::parse(raw)?.into_entity(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file_ref(path: &str) -> EntityRef {
        EntityRef::File {
            path: PathBuf::from(path),
        }
    }

    fn tenant_yaml(name: &str, host: &str) -> String {
        format!(
            "kind: Tenant\nmetadata:\n  name: {}\nspec:\n  hosts:\n    - {}\n",
            name, host
        )
    }

    fn client_yaml(name: &str, ident: &str, tenant: &str) -> String {
        format!(
            "kind: Client\nmetadata:\n  name: {}\nspec:\n  ident: {}\n  tenantname: {}\n",
            name, ident, tenant
        )
    }

    #[test]
    fn orphan_clients_apply_when_their_tenant_arrives() {
        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());

        loader.handle_event(SourceEvent::Added(
            file_ref("/c/portal.yaml"),
            client_yaml(
                "portal",
                "9e530ab5-a9b7-4942-a825-5bfebeef1f43",
                "acme",
            ),
        ));
        assert_eq!(store.client_count(), 0);
        assert_eq!(loader.pending_count(), 1);

        loader.handle_event(SourceEvent::Added(
            file_ref("/t/acme.yaml"),
            tenant_yaml("acme", "acme.test"),
        ));
        assert_eq!(store.client_count(), 1);
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn malformed_documents_keep_the_previous_version_live() {
        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());

        loader.handle_event(SourceEvent::Added(
            file_ref("/t/acme.yaml"),
            tenant_yaml("acme", "acme.test"),
        ));
        loader.handle_event(SourceEvent::Modified(
            file_ref("/t/acme.yaml"),
            "kind: Tenant\nmetadata: broken".to_string(),
        ));
        assert!(store.tenant("acme").is_some());
    }

    #[test]
    fn host_collisions_reject_without_removing_anything() {
        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());

        loader.handle_event(SourceEvent::Added(
            file_ref("/t/one.yaml"),
            tenant_yaml("one", "shared.test"),
        ));
        loader.handle_event(SourceEvent::Added(
            file_ref("/t/two.yaml"),
            tenant_yaml("two", "shared.test"),
        ));
        assert!(store.tenant("one").is_some());
        assert!(store.tenant("two").is_none());
    }

    #[test]
    fn deletes_remove_whichever_entity_carried_the_reference() {
        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());

        loader.handle_event(SourceEvent::Added(
            file_ref("/t/acme.yaml"),
            tenant_yaml("acme", "acme.test"),
        ));
        loader.handle_event(SourceEvent::Added(
            file_ref("/c/portal.yaml"),
            client_yaml(
                "portal",
                "9e530ab5-a9b7-4942-a825-5bfebeef1f43",
                "acme",
            ),
        ));
        loader.handle_event(SourceEvent::Deleted(file_ref("/c/portal.yaml")));
        assert_eq!(store.client_count(), 0);
        loader.handle_event(SourceEvent::Deleted(file_ref("/t/acme.yaml")));
        assert_eq!(store.tenant_count(), 0);
    }

    #[test]
    fn pending_duplicates_latest_document_wins() {
        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());

        loader.handle_event(SourceEvent::Added(
            file_ref("/c/portal.yaml"),
            client_yaml(
                "portal-old",
                "9e530ab5-a9b7-4942-a825-5bfebeef1f43",
                "acme",
            ),
        ));
        loader.handle_event(SourceEvent::Modified(
            file_ref("/c/portal.yaml"),
            client_yaml(
                "portal-new",
                "9e530ab5-a9b7-4942-a825-5bfebeef1f43",
                "acme",
            ),
        ));
        assert_eq!(loader.pending_count(), 1);

        loader.handle_event(SourceEvent::Added(
            file_ref("/t/acme.yaml"),
            tenant_yaml("acme", "acme.test"),
        ));
        let client = store.client("9e530ab5-a9b7-4942-a825-5bfebeef1f43").unwrap();
        assert_eq!(client.name, "portal-new");
    }
}
