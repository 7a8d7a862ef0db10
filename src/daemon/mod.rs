// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon management module
//!
//! Coordinates the background services of the authorization server: the
//! web server itself, the declarative entity sources, the session store
//! sweep, the template worker and a heartbeat.

pub mod launch_daemon;

pub use launch_daemon::Daemon;
