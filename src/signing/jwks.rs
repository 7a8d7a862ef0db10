// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JSON Web Key Set export
//!
//! Converts the RSA public keys of the ring into the JWK representation
//! (RFC 7517) served on `/.well-known/jwks.json`. Every record keeps its
//! ring `kid`, so verifiers can match tokens to keys across rotations.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use super::keys::KeyRing;

/// JSON Web Key Set.
///
/// The serialized form is the exact JWKS document: `{"keys": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwkKeySet {
    /// The set of JWKs.
    pub keys: Vec<Jwk>,
}

impl JwkKeySet {
    /// Export the ring's public keys.
    ///
    /// An empty ring generates its first key before exporting, so the
    /// JWKS endpoint never publishes an empty set.
    pub fn from_ring(ring: &KeyRing) -> Result<Self> {
        if ring.is_empty() {
            ring.active_signing_key()?;
        }
        let mut keys = Vec::new();
        for record in ring.records() {
            keys.push(Self::create_jwk_from_pem(
                record.public_pem.as_bytes(),
                &record.kid,
            )?);
        }
        Ok(Self { keys })
    }

    /// Create a JWK from a PEM encoded RSA public key.
    ///
    /// # Parameters
    ///
    /// * `pem_data` - The PEM encoded RSA public key as bytes
    /// * `kid` - Key identifier stamped into the JWK
    ///
    /// # Returns
    ///
    /// A JWK representing the RSA public key, or an error if parsing fails
    pub fn create_jwk_from_pem(pem_data: &[u8], kid: &str) -> Result<Jwk> {
        let public_key = RsaPublicKey::from_pkcs1_pem(std::str::from_utf8(pem_data)?)
            .context("Failed to parse RSA public key from PEM")?;
        Self::create_jwk_from_public_key(&public_key, kid)
    }

    /// Create a JWK from an RSA public key.
    ///
    /// The modulus and exponent are base64url encoded without padding as
    /// RFC 7518 requires for the `n` and `e` members.
    pub fn create_jwk_from_public_key(public_key: &RsaPublicKey, kid: &str) -> Result<Jwk> {
        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

        let jwk = Jwk {
            common: jsonwebtoken::jwk::CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_id: Some(kid.to_string()),
                key_algorithm: Some(jsonwebtoken::jwk::KeyAlgorithm::RS256),
                ..Default::default()
            },
            algorithm: jsonwebtoken::jwk::AlgorithmParameters::RSA(
                jsonwebtoken::jwk::RSAKeyParameters {
                    key_type: jsonwebtoken::jwk::RSAKeyType::RSA,
                    n,
                    e,
                },
            ),
        };

        Ok(jwk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_generates_a_key_for_an_empty_ring() {
        let ring = KeyRing::new();
        let set = JwkKeySet::from_ring(&ring).unwrap();
        assert_eq!(set.keys.len(), 1);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn exported_keys_keep_their_ring_kid() {
        let ring = KeyRing::new();
        let record = ring.active_signing_key().unwrap();
        ring.rotate("2030-06-01").unwrap();
        let set = JwkKeySet::from_ring(&ring).unwrap();
        let kids: Vec<_> = set
            .keys
            .iter()
            .map(|k| k.common.key_id.clone().unwrap())
            .collect();
        assert!(kids.contains(&record.kid));
        assert!(kids.contains(&"2030-06-01".to_string()));
    }

    #[test]
    fn jwks_document_shape() {
        let ring = KeyRing::new();
        let set = JwkKeySet::from_ring(&ring).unwrap();
        let value = serde_json::to_value(&set).unwrap();
        let key = &value["keys"][0];
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["alg"], "RS256");
        assert_eq!(key["use"], "sig");
        assert!(key["n"].as_str().unwrap().len() > 300);
    }
}
