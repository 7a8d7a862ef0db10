// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rocket application assembly
//!
//! [`AppState`] bundles every shared component of the pipeline (entity
//! store, session store, signer, event recorder, template registry and
//! script host), and [`build_rocket`] mounts the routes around one such
//! state. Tests build their own state (with their own stores) and get a
//! fully isolated application.

use log::debug;
use rand::Rng;
use rocket::figment::Figment;
use rocket::{routes, Build, Rocket};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::domain::EntityStore;
use crate::events::EventRecorder;
use crate::scripting::ScriptHost;
use crate::sessions::{CodeStore, MemoryCodeStore, RedisCodeStore};
use crate::signing::Signer;
use crate::templates::TemplateRegistry;

use super::session::TokenCookieBridge;

/// Shared state of the Rocket application.
pub struct AppState {
    /// Application configuration.
    pub config: Config,

    /// Registry of tenants and clients.
    pub store: Arc<EntityStore>,

    /// Authorization code / login session store.
    pub sessions: Arc<dyn CodeStore>,

    /// Token signer.
    pub signer: Arc<Signer>,

    /// Counter registry and back-reporting.
    pub events: Arc<EventRecorder>,

    /// Page template registry.
    pub templates: Arc<TemplateRegistry>,

    /// Provider script host.
    pub scripts: ScriptHost,

    /// Direct handle on the memory backend, when active, for the
    /// daemon's periodic sweep task.
    pub memory_sessions: Option<Arc<MemoryCodeStore>>,
}

impl AppState {
    /// Build the state from a configuration.
    ///
    /// The session backend follows the configuration: Redis when a host
    /// is configured, the in-process map otherwise. The HS256 secret
    /// comes from the configuration or, absent that, is drawn fresh,
    /// which invalidates outstanding tokens on restart.
    pub fn from_config(config: Config) -> Self {
        let secret = config
            .jwt
            .secret
            .clone()
            .unwrap_or_else(random_secret);

        let mut memory_sessions = None;
        let sessions: Arc<dyn CodeStore> = match config.redis.url() {
            Some(url) => {
                debug!("Using Redis session store");
                Arc::new(RedisCodeStore::new(
                    url,
                    Duration::from_secs(config.redis.operation_timeout_seconds),
                ))
            }
            None => {
                debug!("Using in-memory session store");
                let memory = Arc::new(MemoryCodeStore::new());
                memory_sessions = Some(memory.clone());
                memory
            }
        };

        let store = Arc::new(EntityStore::new());
        let events = Arc::new(EventRecorder::new());

        // Entity population gauges follow the store hooks
        let recorder = events.clone();
        store.subscribe(move |change| recorder.record_entity_change(change));

        let scripts = ScriptHost::new(Duration::from_millis(config.oauth.script_timeout_ms));

        Self {
            config,
            store,
            sessions,
            signer: Arc::new(Signer::new(secret.as_bytes())),
            events,
            templates: Arc::new(TemplateRegistry::new()),
            scripts,
            memory_sessions,
        }
    }
}

/// Draw a fresh random HS256 secret.
fn random_secret() -> String {
    let mut rng = rand::rng();
    (0..32)
        .map(|_| format!("{:02x}", rng.random_range(0..=255_u8)))
        .collect()
}

/// Rocket figment for the configured bind address.
fn figment(config: &Config) -> Figment {
    // Rocket's secret_key guards its own cookie crypto; derive it from
    // the deployment so restarts agree across replicas
    let derived: String = Sha256::digest(
        format!(
            "{}:{}:{}",
            config.server.address, config.server.port, config.server.cookie_name
        )
        .as_bytes(),
    )
    .iter()
    .map(|b| format!("{:02x}", b))
    .collect();

    rocket::Config::figment()
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port))
        .merge(("secret_key", derived))
}

/// Build a configured Rocket server instance.
///
/// Mounts the full route set of the authorization pipeline and attaches
/// the cookie-to-header bridge.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let figment = figment(&state.config);
    let bridge = TokenCookieBridge::new(state.config.server.cookie_name.clone());

    rocket::custom(figment)
        .attach(bridge)
        .mount(
            "/",
            routes![
                super::health::index,
                super::health::health,
                super::health::health_ready,
                super::health::versions,
                super::health::metrics,
                super::authorize::authorize,
                super::login::login,
                super::login::logout_page,
                super::login::logout_submit,
                super::login::logout_finalize,
                super::token::token,
                super::token::token_info,
                super::interceptor::interceptor_get,
                super::interceptor::interceptor_post,
                super::discovery::openid_configuration,
                super::discovery::jwks,
            ],
        )
        .manage(state)
}
