// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Control-plane entity source
//!
//! Watches tenant and client custom resources on the cluster control
//! plane. The watch is a long-lived HTTP response streaming one JSON
//! object per line, Kubernetes style:
//!
//! ```json
//! {"type": "ADDED", "object": {"kind": "Tenant", "metadata": {...}, "spec": {...}}}
//! ```
//!
//! Disconnects are expected; the source reconnects with exponential
//! backoff (1 s doubling up to 60 s) and resets the backoff after a
//! successful connect.

use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::KubernetesConfig;
use crate::domain::EntityRef;

use super::{EntityLoader, SourceEvent};

/// API group of the custom resources.
const API_GROUP: &str = "authgate.io";

/// API version of the custom resources.
const API_VERSION: &str = "v1";

/// In-cluster service account token location.
const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Initial reconnect delay.
const BACKOFF_START: Duration = Duration::from_secs(1);

/// Reconnect delay cap.
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// One line of the watch stream.
#[derive(Debug, Deserialize)]
struct WatchLine {
    /// `ADDED`, `MODIFIED` or `DELETED`.
    #[serde(rename = "type")]
    kind: String,
    /// The resource payload.
    object: serde_json::Value,
}

/// Watches the control-plane custom-resource streams.
pub struct ControlPlaneSource {
    config: KubernetesConfig,
}

impl ControlPlaneSource {
    /// Create a source from the control-plane settings.
    pub fn new(config: KubernetesConfig) -> Self {
        Self { config }
    }

    /// Watch both resource plurals until the task is aborted.
    pub async fn watch(self, loader: Arc<EntityLoader>) {
        let tenants = Self::watch_plural(self.config.clone(), loader.clone(), "tenants");
        let clients = Self::watch_plural(self.config.clone(), loader, "clients");
        futures::join!(tenants, clients);
    }

    fn watch_url(config: &KubernetesConfig, plural: &str) -> String {
        match (&config.scoped, &config.namespace) {
            (true, Some(namespace)) => format!(
                "{}/apis/{}/{}/namespaces/{}/{}?watch=true",
                config.api_url, API_GROUP, API_VERSION, namespace, plural
            ),
            _ => format!(
                "{}/apis/{}/{}/{}?watch=true",
                config.api_url, API_GROUP, API_VERSION, plural
            ),
        }
    }

    async fn watch_plural(config: KubernetesConfig, loader: Arc<EntityLoader>, plural: &str) {
        let url = Self::watch_url(&config, plural);
        let token = tokio::fs::read_to_string(SERVICE_ACCOUNT_TOKEN).await.ok();
        let mut backoff = BACKOFF_START;

        loop {
            match Self::stream_once(&url, token.as_deref(), &loader).await {
                Ok(()) => {
                    // The apiserver closes healthy watches periodically
                    debug!("Watch on {} ended, reconnecting", plural);
                    backoff = BACKOFF_START;
                }
                Err(err) => {
                    warn!(
                        "Control-plane watch on {} failed: {} (retry in {:?})",
                        plural, err, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
    }

    /// Run one watch connection to completion.
    async fn stream_once(
        url: &str,
        token: Option<&str>,
        loader: &EntityLoader,
    ) -> Result<(), anyhow::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let mut request = client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token.trim());
        }
        let response = request.send().await?.error_for_status()?;
        info!("Control-plane watch connected: {}", url);

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if !line.is_empty() {
                    Self::handle_line(line, loader);
                }
            }
        }
        Ok(())
    }

    fn handle_line(line: &str, loader: &EntityLoader) {
        let parsed: WatchLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Skipping unreadable watch line: {}", err);
                return;
            }
        };

        let Some(reference) = Self::reference_of(&parsed.object) else {
            warn!("Watch object without uid, skipping");
            return;
        };

        let event = match parsed.kind.as_str() {
            "ADDED" => SourceEvent::Added(reference, parsed.object.to_string()),
            "MODIFIED" => SourceEvent::Modified(reference, parsed.object.to_string()),
            "DELETED" => SourceEvent::Deleted(reference),
            other => {
                debug!("Ignoring watch event type {}", other);
                return;
            }
        };
        loader.handle_event(event);
    }

    fn reference_of(object: &serde_json::Value) -> Option<EntityRef> {
        let metadata = object.get("metadata")?;
        let uid = metadata.get("uid")?.as_str()?.to_string();
        let revision = metadata
            .get("resourceVersion")
            .and_then(|v| v.as_str())
            .map(String::from);
        Some(EntityRef::ControlPlane { uid, revision })
    }
}
