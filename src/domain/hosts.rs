// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Host pattern matching
//!
//! Tenant host lists mix literal domains with wildcard patterns of the
//! form `*.x.y`. A wildcard stands for exactly one DNS label: `*.a.b`
//! matches `x.a.b` but neither `a.b` nor `x.y.a.b`.

use regex::Regex;

/// Characters a wildcard label may consist of.
const LABEL_PATTERN: &str = "[A-Za-z0-9_-]+";

/// Whether a pattern contains a wildcard label.
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Compile a wildcard host pattern into an anchored regular expression.
///
/// The literal parts of the pattern are escaped; each `*` is replaced by a
/// single-label matcher. Returns `None` for patterns that do not compile
/// (which cannot happen for well-formed host strings, but malformed
/// documents must not panic the server).
pub fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(|part| regex::escape(part)).collect();
    let expression = format!("^{}$", escaped.join(LABEL_PATTERN));
    match Regex::new(&expression) {
        Ok(re) => Some(re),
        Err(err) => {
            log::warn!("Ignoring invalid host pattern {:?}: {}", pattern, err);
            None
        }
    }
}

/// Match a host against a tenant host entry.
///
/// Literal entries compare case-insensitively; wildcard entries match via
/// [`wildcard_regex`].
pub fn host_matches(pattern: &str, host: &str) -> bool {
    if !is_wildcard(pattern) {
        return pattern.eq_ignore_ascii_case(host);
    }
    wildcard_regex(pattern)
        .map(|re| re.is_match(&host.to_ascii_lowercase()))
        .unwrap_or(false)
}
