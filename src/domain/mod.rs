// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Entity model of the authorization server
//!
//! Tenants are the unit of isolation: each owns a set of hosts, a set of
//! provider scripts and optional interceptor and template settings. Clients
//! are OAuth applications registered to exactly one tenant. Both are loaded
//! from declarative documents and kept in the process-wide [`EntityStore`].

pub mod client;
pub mod hosts;
pub mod store;
pub mod tenant;

pub use client::{Client, ClientSpec, GrantType};
pub use store::{Entity, EntityChange, EntityStore, EntityStoreError};
pub use tenant::{
    EntityRef, InterceptorSettings, Tenant, TenantInformations, TenantSpec, TemplateSource,
};
