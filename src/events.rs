// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Event recording
//!
//! Named counters for the authorization pipeline plus per-client denial
//! tallies and a back-report channel. The counter names are part of the
//! public surface; they are exposed with the `authgate_` prefix on the
//! `/metrics` endpoint and forwarded to any registered status reporter
//! (the control-plane loader uses this to update resource status).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::EntityChange;

/// Prefix of every exposed metric name.
pub const METRIC_PREFIX: &str = "authgate";

/// The named counters of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    LoginAttempts,
    LoginSuccess,
    LoginFailure,
    Logout,
    InterceptorSuccess,
    InterceptorFailure,
    AuthorizeAttempts,
    OauthSuccess,
    OauthFailure,
    TokenStored,
}

impl Metric {
    /// Stable metric name, without prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::LoginAttempts => "login_attempts",
            Metric::LoginSuccess => "login_success",
            Metric::LoginFailure => "login_failure",
            Metric::Logout => "logout",
            Metric::InterceptorSuccess => "interceptor_success",
            Metric::InterceptorFailure => "interceptor_failure",
            Metric::AuthorizeAttempts => "authorize_attempts",
            Metric::OauthSuccess => "oauth_success",
            Metric::OauthFailure => "oauth_failure",
            Metric::TokenStored => "token_stored",
        }
    }

    /// All counters, in exposition order.
    pub fn all() -> [Metric; 10] {
        [
            Metric::LoginAttempts,
            Metric::LoginSuccess,
            Metric::LoginFailure,
            Metric::Logout,
            Metric::InterceptorSuccess,
            Metric::InterceptorFailure,
            Metric::AuthorizeAttempts,
            Metric::OauthSuccess,
            Metric::OauthFailure,
            Metric::TokenStored,
        ]
    }
}

/// A status event forwarded to registered reporters.
#[derive(Debug, Clone)]
pub enum StatusReport {
    /// A counter was incremented.
    Counter { name: &'static str, value: u64 },
    /// A client was denied; carries the running total for that client.
    ClientDenied {
        client_id: String,
        reason: String,
        total: u64,
    },
    /// The registered entity population changed.
    EntityCounts { tenants: u64, clients: u64 },
}

type Reporter = Box<dyn Fn(&StatusReport) + Send + Sync>;

/// Counter registry and back-report dispatcher.
#[derive(Default)]
pub struct EventRecorder {
    counters: Mutex<HashMap<&'static str, u64>>,
    denials: Mutex<HashMap<String, u64>>,
    tenants: Mutex<u64>,
    clients: Mutex<u64>,
    reporters: Mutex<Vec<Reporter>>,
}

impl EventRecorder {
    /// Create a recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a back-report callback.
    pub fn subscribe<F>(&self, reporter: F)
    where
        F: Fn(&StatusReport) + Send + Sync + 'static,
    {
        self.reporters.lock().unwrap().push(Box::new(reporter));
    }

    fn report(&self, status: StatusReport) {
        for reporter in self.reporters.lock().unwrap().iter() {
            reporter(&status);
        }
    }

    /// Increment a named counter.
    pub fn observe(&self, metric: Metric) {
        let value = {
            let mut counters = self.counters.lock().unwrap();
            let value = counters.entry(metric.name()).or_insert(0);
            *value += 1;
            *value
        };
        self.report(StatusReport::Counter {
            name: metric.name(),
            value,
        });
    }

    /// Current value of a counter.
    pub fn counter(&self, metric: Metric) -> u64 {
        *self
            .counters
            .lock()
            .unwrap()
            .get(metric.name())
            .unwrap_or(&0)
    }

    /// Record a denial attributed to a client.
    pub fn deny(&self, client_id: &str, reason: &str) {
        let total = {
            let mut denials = self.denials.lock().unwrap();
            let total = denials.entry(client_id.to_string()).or_insert(0);
            *total += 1;
            *total
        };
        self.report(StatusReport::ClientDenied {
            client_id: client_id.to_string(),
            reason: reason.to_string(),
            total,
        });
    }

    /// Track entity population through store change hooks.
    pub fn record_entity_change(&self, change: &EntityChange) {
        {
            match change {
                EntityChange::TenantAdded(_) => *self.tenants.lock().unwrap() += 1,
                EntityChange::TenantRemoved(_) => {
                    let mut tenants = self.tenants.lock().unwrap();
                    *tenants = tenants.saturating_sub(1);
                }
                EntityChange::ClientAdded(_) => *self.clients.lock().unwrap() += 1,
                EntityChange::ClientRemoved(_) => {
                    let mut clients = self.clients.lock().unwrap();
                    *clients = clients.saturating_sub(1);
                }
            }
        }
        self.report(StatusReport::EntityCounts {
            tenants: *self.tenants.lock().unwrap(),
            clients: *self.clients.lock().unwrap(),
        });
    }

    /// Render the plain-text exposition of all counters.
    ///
    /// One `<prefix>_<name> <value>` line per counter, the entity gauges,
    /// then one labelled line per client with recorded denials.
    pub fn render(&self) -> String {
        let mut out = String::new();
        {
            let counters = self.counters.lock().unwrap();
            for metric in Metric::all() {
                let value = counters.get(metric.name()).unwrap_or(&0);
                out.push_str(&format!(
                    "{}_{} {}\n",
                    METRIC_PREFIX,
                    metric.name(),
                    value
                ));
            }
        }
        out.push_str(&format!(
            "{}_tenants_count {}\n",
            METRIC_PREFIX,
            *self.tenants.lock().unwrap()
        ));
        out.push_str(&format!(
            "{}_clients_count {}\n",
            METRIC_PREFIX,
            *self.clients.lock().unwrap()
        ));

        let denials = self.denials.lock().unwrap();
        let mut clients: Vec<_> = denials.iter().collect();
        clients.sort_by(|a, b| a.0.cmp(b.0));
        for (client, total) in clients {
            out.push_str(&format!(
                "{}_client_denials{{client=\"{}\"}} {}\n",
                METRIC_PREFIX, client, total
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn counters_increment_and_render() {
        let recorder = EventRecorder::new();
        recorder.observe(Metric::LoginAttempts);
        recorder.observe(Metric::LoginAttempts);
        recorder.observe(Metric::OauthSuccess);
        assert_eq!(recorder.counter(Metric::LoginAttempts), 2);
        let text = recorder.render();
        assert!(text.contains("authgate_login_attempts 2"));
        assert!(text.contains("authgate_oauth_success 1"));
        assert!(text.contains("authgate_login_failure 0"));
    }

    #[test]
    fn denials_are_tallied_per_client() {
        let recorder = EventRecorder::new();
        recorder.deny("client-a", "redirect mismatch");
        recorder.deny("client-a", "redirect mismatch");
        recorder.deny("client-b", "wrong secret");
        let text = recorder.render();
        assert!(text.contains("authgate_client_denials{client=\"client-a\"} 2"));
        assert!(text.contains("authgate_client_denials{client=\"client-b\"} 1"));
    }

    #[test]
    fn reporters_receive_every_observation() {
        let recorder = EventRecorder::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen_in_cb = seen.clone();
        recorder.subscribe(move |_| {
            seen_in_cb.fetch_add(1, Ordering::SeqCst);
        });
        recorder.observe(Metric::Logout);
        recorder.deny("client-a", "secret");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
