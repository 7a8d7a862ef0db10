// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sandbox engine construction
//!
//! Builds the Rhai engine every sandbox run uses: host functions for
//! logging (`say`, `console.log`, `console.error`), outbound HTTP
//! (`fetch`), digests (`sha256`, `md5`) and the `commit` decision channel,
//! plus the kill switch the timeout trips through the engine progress
//! hook.

use log::{error, info};
use md5::Md5;
use rhai::{Dynamic, Engine, Map};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Maximum number of values one sandbox run may commit. Overflow is
/// reported as a parser error after the run.
pub const COMMIT_CAP: usize = 16;

/// Shared collector of committed values.
///
/// `commit` JSON-stringifies every argument of every invocation into this
/// sink; primaries and extras are kept apart so the caller can read the
/// decision and the overrides independently.
#[derive(Default)]
pub struct CommitSink {
    /// JSON-stringified primary values, in commit order.
    pub primaries: Mutex<Vec<String>>,
    /// JSON-stringified extra values, in commit order.
    pub extras: Mutex<Vec<String>>,
    /// Set when the combined list exceeded [`COMMIT_CAP`].
    pub overflow: AtomicBool,
}

impl CommitSink {
    fn len(&self) -> usize {
        self.primaries.lock().unwrap().len() + self.extras.lock().unwrap().len()
    }

    fn push_primary(&self, value: String) {
        if self.len() >= COMMIT_CAP {
            self.overflow.store(true, Ordering::SeqCst);
            return;
        }
        self.primaries.lock().unwrap().push(value);
    }

    fn push_extra(&self, value: String) {
        if self.len() >= COMMIT_CAP {
            self.overflow.store(true, Ordering::SeqCst);
            return;
        }
        self.extras.lock().unwrap().push(value);
    }
}

/// Receiver of `console.log` / `console.error` method calls.
///
/// Registered as a constant in every sandbox scope so scripts can use the
/// familiar dotted form.
#[derive(Debug, Clone)]
pub struct Console;

fn stringify(value: &Dynamic) -> String {
    match rhai::serde::from_dynamic::<serde_json::Value>(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(json) => json.to_string(),
        Err(_) => value.to_string(),
    }
}

fn json_string(value: &Dynamic) -> String {
    rhai::serde::from_dynamic::<serde_json::Value>(value)
        .map(|json| json.to_string())
        .unwrap_or_else(|_| serde_json::Value::Null.to_string())
}

/// Build a sandbox engine.
///
/// # Parameters
///
/// * `sink` - Commit collector shared with the caller
/// * `kill` - Flag polled by the progress hook; setting it terminates the
///   running script
/// * `fetch_timeout` - Budget of a single `fetch` call
pub fn build_engine(sink: Arc<CommitSink>, kill: Arc<AtomicBool>, fetch_timeout: Duration) -> Engine {
    let mut engine = Engine::new();

    engine.on_progress(move |_| {
        if kill.load(Ordering::SeqCst) {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    // say(...): info log from the tenant script
    engine.register_fn("say", |value: Dynamic| {
        info!("[script] {}", stringify(&value));
    });
    engine.register_fn("say", |a: Dynamic, b: Dynamic| {
        info!("[script] {} {}", stringify(&a), stringify(&b));
    });

    // console.log / console.error
    engine.register_type_with_name::<Console>("Console");
    engine.register_fn("log", |_: &mut Console, value: Dynamic| {
        info!("[script] {}", stringify(&value));
    });
    engine.register_fn("error", |_: &mut Console, value: Dynamic| {
        error!("[script] {}", stringify(&value));
    });

    // Digest helpers
    engine.register_fn("sha256", |input: &str| -> String {
        let digest = Sha256::digest(input.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    });
    engine.register_fn("md5", |input: &str| -> String {
        let digest = Md5::digest(input.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    });

    // fetch(url) / fetch(url, #{method, headers, body}) -> #{code, body}
    engine.register_fn("fetch", move |url: &str| -> Map {
        blocking_fetch(url, None, fetch_timeout)
    });
    engine.register_fn("fetch", move |url: &str, options: Map| -> Map {
        blocking_fetch(url, Some(options), fetch_timeout)
    });

    // commit(primary) / commit(primary, extra)
    let sink_primary = sink.clone();
    engine.register_fn("commit", move |value: Dynamic| {
        sink_primary.push_primary(json_string(&value));
    });
    let sink_both = sink;
    engine.register_fn("commit", move |value: Dynamic, extra: Dynamic| {
        sink_both.push_primary(json_string(&value));
        sink_both.push_extra(json_string(&extra));
    });

    engine
}

/// Perform a blocking HTTP call on behalf of a script.
///
/// The sandbox runs on a blocking worker thread, so a synchronous client
/// is the right tool here. Transport failures are surfaced to the script
/// as `#{code: 0, body: <message>}` rather than as exceptions.
fn blocking_fetch(url: &str, options: Option<Map>, timeout: Duration) -> Map {
    let mut result = Map::new();

    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            result.insert("code".into(), Dynamic::from(0_i64));
            result.insert("body".into(), Dynamic::from(err.to_string()));
            return result;
        }
    };

    let mut method = "GET".to_string();
    let mut body: Option<String> = None;
    let mut headers: Vec<(String, String)> = Vec::new();
    if let Some(options) = options {
        if let Some(m) = options.get("method") {
            method = m.to_string();
        }
        if let Some(b) = options.get("body") {
            body = Some(stringify(b));
        }
        if let Some(h) = options.get("headers") {
            if let Some(map) = h.read_lock::<Map>() {
                for (name, value) in map.iter() {
                    headers.push((name.to_string(), stringify(value)));
                }
            }
        }
    }

    let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let mut request = client.request(method, url);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    match request.send() {
        Ok(response) => {
            result.insert(
                "code".into(),
                Dynamic::from(response.status().as_u16() as i64),
            );
            result.insert(
                "body".into(),
                Dynamic::from(response.text().unwrap_or_default()),
            );
        }
        Err(err) => {
            result.insert("code".into(), Dynamic::from(0_i64));
            result.insert("body".into(), Dynamic::from(err.to_string()));
        }
    }
    result
}
