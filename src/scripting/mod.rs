// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Embedded provider scripts
//!
//! Tenants decide who may log in through small scripts written in Rhai.
//! A provider "class" is a top-level script function named after the
//! class (`UserLoginProvider`, `UserValidationProvider`, or a
//! caller-named custom provider) taking one object-map argument and
//! returning the provider instance as an object map:
//!
//! ```rhai
//! fn UserLoginProvider(credentials) {
//!     let ok = credentials.username == "alice";
//!     commit(ok);
//!     #{ canLogin: ok, userProfile: #{ name: "Alice" }, role: "user" }
//! }
//! ```
//!
//! Every HTTP request that needs a provider decision allocates a fresh
//! [`Sandbox`]: scripts never share mutable state across requests. The
//! sandbox compiles each script (static syntax check), discovers the
//! requested class, instantiates it and waits, up to the configured
//! timeout, for the run to finish. The host `commit` function collects
//! the decision; property reads on the returned instance are exposed as
//! typed getters.
//!
//! # Failure semantics
//!
//! - Compile failure → [`ProviderError::SyntaxError`]
//! - Runtime failure (and commit overflow) → [`ProviderError::ParserError`]
//! - Budget exceeded → [`ProviderError::Timeout`]
//! - Finished without committing → [`ProviderError::NoResults`]

pub mod engine;

use log::debug;
use rhai::{Dynamic, Scope, AST};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine::{build_engine, CommitSink, Console};

/// Class name of the login decision provider.
pub const LOGIN_PROVIDER: &str = "UserLoginProvider";

/// Class name of the username validation provider.
pub const VALIDATION_PROVIDER: &str = "UserValidationProvider";

/// Errors raised by a sandbox run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// A script failed the static syntax check.
    #[error("script syntax error: {0}")]
    SyntaxError(String),

    /// The script failed at runtime, or committed more values than the
    /// sandbox accepts.
    #[error("script evaluation error: {0}")]
    ParserError(String),

    /// The run exceeded its budget and was torn down.
    #[error("script timed out")]
    Timeout,

    /// The provider finished without calling `commit`.
    #[error("script committed no result")]
    NoResults,

    /// None of the loaded scripts defines the requested class.
    #[error("provider class {0} is not defined")]
    MissingClass(String),

    /// The sandbox task failed outside the script (worker panic or
    /// runtime teardown).
    #[error("sandbox failure: {0}")]
    Internal(String),
}

/// Factory for per-request sandboxes.
#[derive(Debug, Clone)]
pub struct ScriptHost {
    timeout: Duration,
}

impl ScriptHost {
    /// Create a host with the given per-run budget.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Allocate a fresh sandbox over a tenant's scripts.
    pub fn sandbox(&self, scripts: &[String]) -> Sandbox {
        Sandbox {
            scripts: scripts.to_vec(),
            timeout: self.timeout,
        }
    }

    /// Whether any of the given scripts defines a class, checking syntax
    /// along the way.
    pub fn defines_class(scripts: &[String], class: &str) -> Result<bool, ProviderError> {
        let engine = rhai::Engine::new();
        for script in scripts {
            let ast = engine
                .compile(script)
                .map_err(|err| ProviderError::SyntaxError(err.to_string()))?;
            if ast_defines(&ast, class) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn ast_defines(ast: &AST, class: &str) -> bool {
    ast.iter_functions().any(|f| f.name == class)
}

/// One isolated evaluation context, destroyed at request end.
pub struct Sandbox {
    scripts: Vec<String>,
    timeout: Duration,
}

impl Sandbox {
    /// Instantiate a provider class and wait for its commit.
    ///
    /// The evaluation runs on a blocking worker under the configured
    /// budget; a timeout trips the engine kill switch so the worker does
    /// not linger.
    ///
    /// # Parameters
    ///
    /// * `class` - Name of the provider class to instantiate
    /// * `args` - Structured constructor argument (e.g. `{username, password}`)
    pub async fn run(&self, class: &str, args: Value) -> Result<ProviderRun, ProviderError> {
        let scripts = self.scripts.clone();
        let class_name = class.to_string();
        let sink = Arc::new(CommitSink::default());
        let kill = Arc::new(AtomicBool::new(false));

        let task_sink = sink.clone();
        let task_kill = kill.clone();
        let handle = tokio::task::spawn_blocking(move || {
            evaluate(scripts, class_name, args, task_sink, task_kill)
        });

        let instance = match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => {
                // Tear the running script down; the worker observes the
                // flag at its next progress tick
                kill.store(true, Ordering::SeqCst);
                return Err(ProviderError::Timeout);
            }
            Ok(Err(join)) => return Err(ProviderError::Internal(join.to_string())),
            Ok(Ok(outcome)) => outcome?,
        };

        if sink.overflow.load(Ordering::SeqCst) {
            return Err(ProviderError::ParserError(
                "commit list exceeded the sandbox cap".into(),
            ));
        }

        let primaries = parse_committed(&sink.primaries.lock().unwrap());
        if primaries.is_empty() {
            return Err(ProviderError::NoResults);
        }
        let extras = parse_committed(&sink.extras.lock().unwrap());

        Ok(ProviderRun {
            instance,
            primaries,
            extras,
        })
    }
}

fn parse_committed(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|s| serde_json::from_str(s).unwrap_or(Value::Null))
        .collect()
}

fn evaluate(
    scripts: Vec<String>,
    class: String,
    args: Value,
    sink: Arc<CommitSink>,
    kill: Arc<AtomicBool>,
) -> Result<Value, ProviderError> {
    let fetch_timeout = Duration::from_secs(10);
    let engine = build_engine(sink, kill, fetch_timeout);

    // Load each script verbatim; a compile failure is a syntax error
    let mut merged: Option<AST> = None;
    for script in &scripts {
        let ast = engine
            .compile(script)
            .map_err(|err| ProviderError::SyntaxError(err.to_string()))?;
        merged = Some(match merged {
            Some(previous) => previous.merge(&ast),
            None => ast,
        });
    }
    let ast = merged.ok_or_else(|| ProviderError::MissingClass(class.clone()))?;

    if !ast_defines(&ast, &class) {
        return Err(ProviderError::MissingClass(class));
    }

    let mut scope = Scope::new();
    scope.push_constant("console", Console);

    let argument = rhai::serde::to_dynamic(&args)
        .map_err(|err| ProviderError::Internal(err.to_string()))?;

    let instance: Dynamic = engine
        .call_fn(&mut scope, &ast, &class, (argument,))
        .map_err(|err| match *err {
            rhai::EvalAltResult::ErrorTerminated(_, _) => ProviderError::Timeout,
            other => ProviderError::ParserError(other.to_string()),
        })?;

    let instance = rhai::serde::from_dynamic::<Value>(&instance).unwrap_or(Value::Null);
    debug!("Provider instance: {}", instance);
    Ok(instance)
}

/// Result of one provider instantiation.
#[derive(Debug, Clone)]
pub struct ProviderRun {
    instance: Value,
    primaries: Vec<Value>,
    extras: Vec<Value>,
}

impl ProviderRun {
    /// The first committed primary value, interpreted truthy/falsy.
    pub fn decision(&self) -> bool {
        self.primaries.first().map(truthy).unwrap_or(false)
    }

    /// All committed primary values.
    pub fn committed(&self) -> &[Value] {
        &self.primaries
    }

    /// Typed boolean property of the instance.
    pub fn bool_property(&self, name: &str) -> Option<bool> {
        self.instance.get(name)?.as_bool()
    }

    /// Typed numeric property of the instance.
    pub fn number_property(&self, name: &str) -> Option<f64> {
        self.instance.get(name)?.as_f64()
    }

    /// Typed string property of the instance.
    pub fn string_property(&self, name: &str) -> Option<String> {
        Some(self.instance.get(name)?.as_str()?.to_string())
    }

    /// Decoded object property of the instance.
    pub fn object_property(&self, name: &str) -> Option<Value> {
        let value = self.instance.get(name)?;
        if value.is_null() {
            None
        } else {
            Some(value.clone())
        }
    }

    /// Subject override from the committed extras, if any extra object
    /// carries a `subject` field.
    pub fn subject_override(&self) -> Option<String> {
        self.extras
            .iter()
            .find_map(|extra| extra.get("subject")?.as_str().map(String::from))
    }

    /// Scopes proposed by the committed extras (space-separated string),
    /// still to be intersected with the client whitelist by the caller.
    pub fn proposed_scopes(&self) -> Vec<String> {
        self.extras
            .iter()
            .find_map(|extra| extra.get("scopes")?.as_str().map(String::from))
            .map(|scopes| scopes.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}
