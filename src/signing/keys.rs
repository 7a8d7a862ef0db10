// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! RSA key ring
//!
//! Rotating RS256 key management. The ring holds `{kid, public, private,
//! created_at, active}` records behind a mutex; exactly one record is
//! active in steady state. An empty ring generates its first key lazily
//! when a signature or the JWKS document is requested.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::Mutex;

/// Modulus size of generated keys.
const RSA_BITS: usize = 2048;

/// One RSA key pair of the ring.
#[derive(Debug, Clone)]
pub struct RsaKeyRecord {
    /// Key identifier, the UTC date of generation (ISO, `YYYY-MM-DD`).
    /// Rotations on the same day get a `-N` suffix.
    pub kid: String,

    /// Public key, PKCS#1 PEM.
    pub public_pem: String,

    /// Private key, PKCS#1 PEM.
    pub private_pem: String,

    /// Generation timestamp.
    pub created_at: DateTime<Utc>,

    /// Whether this record signs new tokens. Inactive records remain in
    /// the ring for verification until garbage collected.
    pub active: bool,
}

/// Mutex-guarded set of RSA key records.
pub struct KeyRing {
    records: Mutex<Vec<RsaKeyRecord>>,
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRing {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// The active signing key, generating one when the ring is empty.
    ///
    /// Generation and activation happen atomically under the ring mutex:
    /// concurrent callers observe either no key (and one of them
    /// generates) or the same active record.
    pub fn active_signing_key(&self) -> Result<RsaKeyRecord> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter().find(|r| r.active) {
            return Ok(record.clone());
        }

        let kid = Self::unique_kid(&records, &Utc::now().format("%Y-%m-%d").to_string());
        let record = Self::generate(kid)?;
        for existing in records.iter_mut() {
            existing.active = false;
        }
        records.push(record.clone());
        info!("Generated RS256 signing key {}", record.kid);
        Ok(record)
    }

    /// Rotate: generate a key named after the given ISO date, activate it
    /// and deactivate all others.
    ///
    /// # Returns
    ///
    /// The `kid` of the new active key.
    pub fn rotate(&self, now_iso_date: &str) -> Result<String> {
        let mut records = self.records.lock().unwrap();
        let kid = Self::unique_kid(&records, now_iso_date);
        let record = Self::generate(kid.clone())?;
        for existing in records.iter_mut() {
            existing.active = false;
        }
        records.push(record);
        info!("Rotated RS256 signing key to {}", kid);
        Ok(kid)
    }

    /// Remove inactive keys strictly older than the cutoff.
    ///
    /// The active key is never removed, whatever its age.
    ///
    /// # Returns
    ///
    /// Number of removed records.
    pub fn gc(&self, older_than: DateTime<Utc>) -> usize {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.active || r.created_at >= older_than);
        let removed = before - records.len();
        if removed > 0 {
            info!("Garbage collected {} retired RS256 keys", removed);
        }
        removed
    }

    /// Look up a record by kid.
    pub fn key(&self, kid: &str) -> Option<RsaKeyRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.kid == kid)
            .cloned()
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<RsaKeyRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of records in the ring.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether the ring holds no keys yet.
    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    fn unique_kid(records: &[RsaKeyRecord], base: &str) -> String {
        if !records.iter().any(|r| r.kid == base) {
            return base.to_string();
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{}-{}", base, counter);
            if !records.iter().any(|r| r.kid == candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn generate(kid: String) -> Result<RsaKeyRecord> {
        let mut rng = rsa::rand_core::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
            .context("Failed to generate RSA private key")?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .context("Failed to encode private key as PEM")?
            .to_string();
        let public_pem = public_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .context("Failed to encode public key as PEM")?;

        Ok(RsaKeyRecord {
            kid,
            public_pem,
            private_pem,
            created_at: Utc::now(),
            active: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn lazy_generation_marks_single_active_key() {
        let ring = KeyRing::new();
        assert!(ring.is_empty());
        let first = ring.active_signing_key().unwrap();
        let second = ring.active_signing_key().unwrap();
        assert_eq!(first.kid, second.kid);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn rotation_deactivates_previous_keys() {
        let ring = KeyRing::new();
        let first = ring.active_signing_key().unwrap();
        let rotated = ring.rotate("2030-01-01").unwrap();
        assert_ne!(first.kid, rotated);
        let records = ring.records();
        assert_eq!(records.iter().filter(|r| r.active).count(), 1);
        assert!(records.iter().find(|r| r.kid == rotated).unwrap().active);
        assert!(!records.iter().find(|r| r.kid == first.kid).unwrap().active);
    }

    #[test]
    fn same_day_rotations_get_unique_kids() {
        let ring = KeyRing::new();
        let a = ring.rotate("2030-01-01").unwrap();
        let b = ring.rotate("2030-01-01").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn gc_never_removes_the_active_key() {
        let ring = KeyRing::new();
        ring.active_signing_key().unwrap();
        ring.rotate("2030-01-01").unwrap();
        // Cutoff in the future: everything inactive qualifies
        let removed = ring.gc(Utc::now() + Duration::hours(1));
        assert_eq!(removed, 1);
        let records = ring.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].active);
    }
}
