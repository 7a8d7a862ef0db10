// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the authorization server
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema before deserialization, so a malformed
//! file fails fast with a schema error instead of a confusing serde message.
//!
//! ## Configuration Structure
//!
//! The configuration is organized as a nested structure with sections:
//! - `server`: HTTP bind address, cookie and header names, secure flag
//! - `jwt`: HS256 secret and token lifetime
//! - `oauth`: code/refresh/login-session TTLs and script budget
//! - `redis`: optional external session store
//! - `entities`: declarative tenant/client sources
//! - `templates`: per-tenant template view root
//!
//! ## Loading
//!
//! [`Config::from_file`] runs a fixed pipeline: read, YAML parse, schema
//! validation, deserialization, cross-field checks. Each stage maps to its
//! own [`ConfigError`] variant so the operator sees which stage rejected
//! the file, and a rejected file leaves an editable
//! `config.sample.yaml` next to it. A missing file is not an error: the
//! defaults are written out and used.
//!
//! ## Environment Overrides
//!
//! A handful of settings are also read from the environment so that
//! container deployments do not need to template the YAML file:
//! `JWT_SECRET`, `REDIS_HOST`, `REDIS_PASSWORD`, `SECURE`,
//! `SUPPORT_KUBERNETES_CRD`, `SCOPED_KUBERNETES_CRD`, `NAMESPACE` and
//! `AUTHGATE_RESOURCES`.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_authgate::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply environment variables and command line overrides
//! config.apply_env();
//! config.apply_args(Some("0.0.0.0".to_string()), Some(8081));
//!
//! println!("Server port: {}", config.server.port);
//! ```

pub mod entities;
pub mod jwt;
pub mod oauth;
pub mod redis;
pub mod server;
pub mod templates;
pub mod utils;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use entities::{EntityConfig, KubernetesConfig};
pub use jwt::JwtConfig;
pub use oauth::OAuthConfig;
pub use redis::RedisConfig;
pub use server::ServerConfig;
pub use templates::TemplatesConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// Embedded JSON schema the configuration is validated against.
const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Why a configuration file was rejected.
///
/// One variant per loading stage, so log output and the process exit
/// message name the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("cannot access configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not parseable YAML, or does not deserialize into
    /// the configuration structure.
    #[error("configuration is not valid YAML: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// The document parsed but the schema rejected it.
    #[error("configuration rejected by schema: {0}")]
    Schema(String),

    /// The document passed the schema but failed a cross-field rule
    /// (port range, TTLs, namespace scoping).
    #[error("configuration rejected: {0}")]
    Invalid(String),
}

/// Root configuration structure for the authorization server.
///
/// This structure serves as the main container for all configuration
/// sections. It is deserialized from YAML using serde and validated
/// against the embedded JSON schema in `resources/config.schema.json`.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, allowing for minimal configuration when custom
/// settings are not required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings for the HTTP front: bind address, port, cookie and
    /// header names, and the secure flag.
    #[serde(default)]
    pub server: ServerConfig,

    /// JWT signing settings: HS256 secret and token lifetime.
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Authorization pipeline tunables: code, refresh and login-session
    /// lifetimes, refresh rotation policy and the script budget.
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Optional external key-value session store. When no host is
    /// configured the in-memory backend is used.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Declarative tenant/client sources: watched directory and
    /// control-plane stream.
    #[serde(default)]
    pub entities: EntityConfig,

    /// Per-tenant template loader settings.
    #[serde(default)]
    pub templates: TemplatesConfig,
}

impl Config {
    /// Load the configuration from a file.
    ///
    /// A missing file is not an error: the defaults are written to the
    /// given path and returned, so a fresh deployment starts with a
    /// documented baseline. A present but rejected file leaves an
    /// editable `*.sample.yaml` with the defaults next to it and
    /// reports the stage that failed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(
                "No configuration at {}, writing the defaults",
                path.display()
            );
            let defaults = Self::default();
            defaults.write_to(path)?;
            return Ok(defaults);
        }

        debug!("Loading configuration from {}", path.display());
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match Self::parse(&raw) {
            Ok(config) => Ok(config),
            Err(err) => {
                error!("Configuration {} rejected: {}", path.display(), err);
                Self::leave_sample_next_to(path);
                Err(err)
            }
        }
    }

    /// Parse and validate a configuration document.
    ///
    /// The pipeline is: YAML parse, schema validation of the generic
    /// value, deserialization into [`Config`], cross-field rules. Schema
    /// validation runs on the generic value so unknown or mistyped keys
    /// surface with their JSON pointer instead of a serde type error.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let yaml: serde_yml::Value = serde_yml::from_str(raw)?;
        let generic = serde_json::to_value(&yaml)
            .map_err(|err| ConfigError::Schema(err.to_string()))?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).expect("embedded schema is valid JSON");
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|err| ConfigError::Schema(err.to_string()))?;
        validator
            .validate(&generic)
            .map_err(|err| ConfigError::Schema(err.to_string()))?;

        let config: Config = serde_yml::from_str(raw)?;

        utils::validate_specific_rules(&config)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        Ok(config)
    }

    /// Serialize the configuration to a YAML file, creating parent
    /// directories as needed.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }
        let yaml = serde_yml::to_string(self)?;
        fs::write(path, yaml).map_err(io_error)
    }

    /// Leave an editable sample with the defaults next to a rejected
    /// configuration file.
    fn leave_sample_next_to(path: &Path) {
        let sample = path.with_extension("sample.yaml");
        match Self::default().write_to(&sample) {
            Ok(()) => warn!(
                "Wrote an editable sample to {}; adjust and rename it",
                sample.display()
            ),
            Err(err) => error!("Could not write sample configuration: {}", err),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Container deployments configure secrets and backend addresses
    /// through the environment rather than the YAML file. Environment
    /// values always win over file values.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = env::var("JWT_SECRET") {
            debug!("Overriding JWT secret from environment");
            self.jwt.secret = Some(secret);
        }
        if let Ok(host) = env::var("REDIS_HOST") {
            debug!("Overriding Redis host from environment: {}", host);
            self.redis.host = Some(host);
        }
        if let Ok(password) = env::var("REDIS_PASSWORD") {
            debug!("Overriding Redis password from environment");
            self.redis.password = Some(password);
        }
        if let Ok(secure) = env::var("SECURE") {
            let secure = matches!(secure.as_str(), "1" | "true" | "yes");
            debug!("Overriding secure flag from environment: {}", secure);
            self.server.secure = secure;
        }
        if let Ok(enabled) = env::var("SUPPORT_KUBERNETES_CRD") {
            self.entities.kubernetes.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
        }
        if let Ok(scoped) = env::var("SCOPED_KUBERNETES_CRD") {
            self.entities.kubernetes.scoped = matches!(scoped.as_str(), "1" | "true" | "yes");
        }
        if let Ok(namespace) = env::var("NAMESPACE") {
            self.entities.kubernetes.namespace = Some(namespace);
        }
        if let Ok(root) = env::var("AUTHGATE_RESOURCES") {
            debug!(
                "Overriding entity resources root from environment: {}",
                root
            );
            self.entities.resources_root = PathBuf::from(root);
        }
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the existing
    /// configuration.
    ///
    /// # Parameters
    ///
    /// * `hostname` - Network address for the server to bind to
    /// * `port` - TCP port for the server
    pub fn apply_args(&mut self, hostname: Option<String>, port: Option<u16>) {
        if let Some(hostname) = hostname {
            debug!("Overriding address from command line: {}", hostname);
            self.server.address = hostname;
        }
        if let Some(port) = port {
            debug!("Overriding port from command line: {}", port);
            self.server.port = port;
        }
    }
}
