// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! File-based entity source
//!
//! Watches a configuration root with two subdirectories, `Tenants/` and
//! `Clients/`, each holding YAML documents. The initial scan applies all
//! tenants before any client; afterwards the directory is rescanned on a
//! fixed interval and modification-time changes are emitted as
//! added/modified/deleted events.

use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::domain::EntityRef;

use super::{EntityLoader, SourceEvent};

/// Subdirectory holding tenant documents.
const TENANTS_DIR: &str = "Tenants";

/// Subdirectory holding client documents.
const CLIENTS_DIR: &str = "Clients";

/// Watches a directory of declarative documents.
pub struct FileSource {
    root: PathBuf,
    /// Modification times of the documents seen in the previous scan.
    seen: HashMap<PathBuf, SystemTime>,
}

impl FileSource {
    /// Create a source over the given configuration root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seen: HashMap::new(),
        }
    }

    /// Run one scan and apply the differences through the loader.
    ///
    /// Tenant documents are visited before client documents so a fresh
    /// directory loads without transient orphans.
    pub async fn scan(&mut self, loader: &EntityLoader) {
        let mut current: HashMap<PathBuf, SystemTime> = HashMap::new();

        for dir in [TENANTS_DIR, CLIENTS_DIR] {
            let documents = Self::list_documents(&self.root.join(dir)).await;
            for (path, modified) in documents {
                current.insert(path.clone(), modified);
                let known = self.seen.get(&path);
                let event = match known {
                    None => Some(Self::read_event(&path, false).await),
                    Some(previous) if *previous != modified => {
                        Some(Self::read_event(&path, true).await)
                    }
                    Some(_) => None,
                };
                if let Some(Some(event)) = event {
                    loader.handle_event(event);
                }
            }
        }

        // Anything seen before but gone now was deleted
        for path in self.seen.keys() {
            if !current.contains_key(path) {
                loader.handle_event(SourceEvent::Deleted(EntityRef::File { path: path.clone() }));
            }
        }

        self.seen = current;
    }

    /// Watch loop: scan on the given cadence until the task is aborted.
    pub async fn watch(mut self, loader: std::sync::Arc<EntityLoader>, interval_seconds: u64) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
        loop {
            ticker.tick().await;
            self.scan(&loader).await;
        }
    }

    async fn list_documents(dir: &Path) -> Vec<(PathBuf, SystemTime)> {
        let mut documents = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Entity directory {:?} not readable: {}", dir, err);
                return documents;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }
            match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => documents.push((path, modified)),
                Err(err) => warn!("Could not stat {:?}: {}", path, err),
            }
        }
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        documents
    }

    async fn read_event(path: &Path, modified: bool) -> Option<SourceEvent> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Could not read document {:?}: {}", path, err);
                return None;
            }
        };
        let reference = EntityRef::File {
            path: path.to_path_buf(),
        };
        Some(if modified {
            SourceEvent::Modified(reference, raw)
        } else {
            SourceEvent::Added(reference, raw)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityStore;
    use std::sync::Arc;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn initial_scan_loads_tenants_before_clients() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join(TENANTS_DIR),
            "acme.yaml",
            "kind: Tenant\nmetadata:\n  name: acme\nspec:\n  hosts: [acme.test]\n",
        );
        write(
            &root.path().join(CLIENTS_DIR),
            "portal.yaml",
            "kind: Client\nmetadata:\n  name: portal\nspec:\n  ident: 9e530ab5-a9b7-4942-a825-5bfebeef1f43\n  tenantname: acme\n",
        );

        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());
        let mut source = FileSource::new(root.path());
        source.scan(&loader).await;

        assert_eq!(store.tenant_count(), 1);
        assert_eq!(store.client_count(), 1);
        assert_eq!(loader.pending_count(), 0);
    }

    #[tokio::test]
    async fn removed_files_remove_their_entities() {
        let root = tempfile::tempdir().unwrap();
        let tenant_file = root.path().join(TENANTS_DIR).join("acme.yaml");
        write(
            &root.path().join(TENANTS_DIR),
            "acme.yaml",
            "kind: Tenant\nmetadata:\n  name: acme\nspec:\n  hosts: [acme.test]\n",
        );

        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());
        let mut source = FileSource::new(root.path());
        source.scan(&loader).await;
        assert_eq!(store.tenant_count(), 1);

        std::fs::remove_file(&tenant_file).unwrap();
        source.scan(&loader).await;
        assert_eq!(store.tenant_count(), 0);
    }

    #[tokio::test]
    async fn modified_files_replace_their_entities() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join(TENANTS_DIR),
            "acme.yaml",
            "kind: Tenant\nmetadata:\n  name: acme\nspec:\n  hosts: [acme.test]\n",
        );

        let store = Arc::new(EntityStore::new());
        let loader = EntityLoader::new(store.clone());
        let mut source = FileSource::new(root.path());
        source.scan(&loader).await;

        // Rewrite with a different host set and an mtime in the future so
        // filesystems with coarse timestamps still register the change
        let path = root.path().join(TENANTS_DIR).join("acme.yaml");
        std::fs::write(
            &path,
            "kind: Tenant\nmetadata:\n  name: acme\nspec:\n  hosts: [acme.test, www.acme.test]\n",
        )
        .unwrap();
        let future = SystemTime::now() + std::time::Duration::from_secs(5);
        let file = std::fs::File::open(&path).unwrap();
        file.set_modified(future).unwrap();

        source.scan(&loader).await;
        let tenant = store.tenant("acme").unwrap();
        assert_eq!(tenant.spec.hosts.len(), 2);
    }
}
