// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module provides functionality for running and managing the
//! background tasks of the authorization server. It handles the lifecycle
//! of:
//!
//! - The Rocket web server with the authorization pipeline
//! - The declarative entity sources (directory watcher, control-plane
//!   stream)
//! - The session store sweep (memory backend only)
//! - The per-tenant template worker
//! - System heartbeat logging
//!
//! ## Architecture
//!
//! The daemon uses Tokio's asynchronous runtime to manage concurrent
//! tasks. Each service runs as an independent task; the daemon structure
//! tracks the handles and coordinates a graceful shutdown.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_authgate::{config::Config, daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::loader::{ControlPlaneSource, EntityLoader, FileSource};
use crate::server::{build_rocket, AppState};
use crate::templates::TemplateLoader;

/// Cadence of the session store sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Cadence of the heartbeat log line.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Coordinates the background services of the server.
///
/// The `running` flag is shared with the periodic tasks so they drain on
/// shutdown; the web server is stopped through Rocket's own shutdown
/// handle when the process receives its termination signal.
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    server: Option<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    rocket_shutdown: Option<rocket::Shutdown>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            server: None,
            running: Arc::new(AtomicBool::new(true)),
            rocket_shutdown: None,
        }
    }

    /// Launch all configured tasks.
    ///
    /// Builds the application state, wires the template worker and the
    /// entity sources, then ignites and launches the web server.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let state = AppState::from_config(config.clone());

        // Template worker reacts to tenant changes through a channel so
        // the store hook never blocks on I/O
        let (sender, receiver) = TemplateLoader::channel();
        state.store.subscribe(move |change| {
            let _ = sender.send(change.clone());
        });
        let template_loader = TemplateLoader::new(
            config.templates.view_root.clone(),
            Duration::from_secs(config.templates.fetch_timeout_seconds),
            state.templates.clone(),
        );
        self.tasks.push(tokio::spawn(async move {
            template_loader.run(receiver).await;
            Ok(())
        }));

        // Declarative sources
        let entity_loader = Arc::new(EntityLoader::new(state.store.clone()));
        let file_source = FileSource::new(config.entities.resources_root.clone());
        let scan_interval = config.entities.scan_interval_seconds;
        let file_loader = entity_loader.clone();
        self.tasks.push(tokio::spawn(async move {
            file_source.watch(file_loader, scan_interval).await;
            Ok(())
        }));

        if config.entities.kubernetes.enabled {
            info!("Control-plane entity source enabled");
            let source = ControlPlaneSource::new(config.entities.kubernetes.clone());
            let crd_loader = entity_loader.clone();
            self.tasks.push(tokio::spawn(async move {
                source.watch(crd_loader).await;
                Ok(())
            }));
        }

        // Session sweep, memory backend only: Redis expires on its own
        if let Some(memory) = state.memory_sessions.clone() {
            let running = self.running.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                while running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    memory.sweep_expired();
                }
                Ok(())
            }));
        }

        // Heartbeat
        {
            let running = self.running.clone();
            let store = state.store.clone();
            let sessions = state.sessions.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
                while running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    debug!(
                        "Heartbeat: {} tenants, {} clients, {} sessions",
                        store.tenant_count(),
                        store.client_count(),
                        sessions.count().await
                    );
                }
                Ok(())
            }));
        }

        // Web server last: it owns the state from here on
        let rocket = build_rocket(state).ignite().await?;
        self.rocket_shutdown = Some(rocket.shutdown());
        self.server = Some(tokio::spawn(async move {
            rocket.launch().await?;
            Ok(())
        }));

        info!("Daemon launched with {} background tasks", self.tasks.len());
        Ok(())
    }

    /// Signal all tasks to terminate.
    pub fn shutdown(&self) {
        info!("Shutting down daemon");
        self.running.store(false, Ordering::SeqCst);
        if let Some(shutdown) = &self.rocket_shutdown {
            shutdown.clone().notify();
        }
    }

    /// Wait for the web server to drain, then detach the periodic tasks.
    pub async fn join(&mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("Web server ended with error: {}", err),
                Err(err) => warn!("Web server task panicked: {}", err),
            }
        }
        for task in std::mem::take(&mut self.tasks) {
            task.abort();
        }
        Ok(())
    }
}
