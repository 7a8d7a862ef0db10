// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::debug;

use super::Config;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It outputs the full JSON schema for the configuration
/// to stdout, formatted for readability.
///
/// # Example
///
/// ```bash
/// ./rust_authgate --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    // Load the schema from the embedded string
    let schema_str = include_str!("../../resources/config.schema.json");

    // Parse the schema to a JSON Value to pretty-format it
    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
///
/// # Arguments
///
/// * `addr` - The address string to validate
///
/// # Returns
///
/// `true` if the address is valid, `false` otherwise
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// This function performs deeper validation checks that can't be easily
/// expressed in a JSON schema, such as value ranges and inter-field
/// consistency.
///
/// # Arguments
///
/// * `config` - The configuration object to validate
///
/// # Returns
///
/// * `Ok(())` if all validations pass
/// * `Err(anyhow::Error)` with descriptive message if any validation fails
///
/// # Validation Rules
///
/// This function validates:
///
/// - **Port Range**: Ensures the server port is within a valid range (1-65534)
/// - **IP Address Format**: Checks if the provided address is a valid IP address or special value
/// - **Lifetimes**: All TTL settings must be strictly positive
/// - **Kubernetes Scope**: A scoped control-plane watch needs a namespace
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    // Check value ranges for certain fields
    if config.server.port < 1 || config.server.port > 65534 {
        anyhow::bail!("Invalid port number: {}", config.server.port);
    }

    // Check if the address is in a valid format
    if !is_valid_ip_address(&config.server.address) {
        debug!(
            "Potentially invalid address format: {}",
            config.server.address
        );
        // Just issue a warning but don't block
    }

    if config.jwt.expiration_seconds <= 0 {
        anyhow::bail!(
            "Invalid token expiration: {}",
            config.jwt.expiration_seconds
        );
    }
    if config.oauth.authcode_ttl_seconds <= 0 {
        anyhow::bail!(
            "Invalid authorization code TTL: {}",
            config.oauth.authcode_ttl_seconds
        );
    }
    if config.oauth.refresh_ttl_seconds <= 0 {
        anyhow::bail!(
            "Invalid refresh token TTL: {}",
            config.oauth.refresh_ttl_seconds
        );
    }
    if config.oauth.login_session_ttl_seconds <= 0 {
        anyhow::bail!(
            "Invalid login session TTL: {}",
            config.oauth.login_session_ttl_seconds
        );
    }

    if config.entities.kubernetes.scoped
        && config.entities.kubernetes.enabled
        && config.entities.kubernetes.namespace.is_none()
    {
        anyhow::bail!("Scoped control-plane watch requires a namespace");
    }

    Ok(())
}
