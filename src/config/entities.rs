// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Declarative entity source configuration
//!
//! Tenants and clients are loaded from declarative documents. Two sources
//! exist: a watched directory with `Tenants/` and `Clients/` subfolders,
//! and a cluster control-plane stream of custom resources. Both can be
//! active at the same time; their references never collide.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the declarative entity sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Root directory holding `Tenants/` and `Clients/` document folders.
    ///
    /// Overridable with the `AUTHGATE_RESOURCES` environment variable.
    #[serde(default = "default_resources_root")]
    pub resources_root: PathBuf,

    /// Interval in seconds between directory rescans. Default 2.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,

    /// Control-plane (custom resource) watch settings.
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
}

/// Control-plane watch settings, Kubernetes-CRD shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// Watch tenant/client custom resources. Overridable with
    /// `SUPPORT_KUBERNETES_CRD`.
    #[serde(default)]
    pub enabled: bool,

    /// Restrict the watch to a single namespace. Overridable with
    /// `SCOPED_KUBERNETES_CRD`.
    #[serde(default)]
    pub scoped: bool,

    /// Namespace used when `scoped` is set. Overridable with `NAMESPACE`.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Base URL of the control-plane API. Defaults to the in-cluster
    /// apiserver address.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_resources_root() -> PathBuf {
    PathBuf::from("./resources/entities")
}

fn default_scan_interval() -> u64 {
    2
}

fn default_api_url() -> String {
    "https://kubernetes.default.svc".to_string()
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            resources_root: default_resources_root(),
            scan_interval_seconds: default_scan_interval(),
            kubernetes: KubernetesConfig::default(),
        }
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scoped: false,
            namespace: None,
            api_url: default_api_url(),
        }
    }
}
