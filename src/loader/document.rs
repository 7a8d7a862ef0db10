// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-authgate project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Declarative entity documents
//!
//! Tenants and clients are declared in YAML documents with `kind`,
//! `metadata.name` and a `spec` mirroring the entity model. The control
//! plane delivers the same documents as JSON, which the YAML parser
//! accepts unchanged. Unknown fields are tolerated and logged at debug
//! level so a newer document schema does not break an older server.

use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::client::ClientSpec;
use crate::domain::tenant::TenantSpec;
use crate::domain::{Client, EntityRef, Tenant};

/// Document metadata common to both kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// Entity name; for tenants this must be a valid slug.
    pub name: String,

    /// Control-plane object UID, absent on file documents.
    #[serde(default)]
    pub uid: Option<String>,

    /// Control-plane resource revision, absent on file documents.
    #[serde(default, rename = "resourceVersion")]
    pub resource_version: Option<String>,

    /// Further metadata (namespace, labels, …) carried along untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yml::Value>,
}

/// Client `spec` as written in documents: the [`ClientSpec`] plus the
/// client identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientDocumentSpec {
    /// The client identifier, a UUID acting as `client_id`.
    #[serde(alias = "id")]
    pub ident: Uuid,

    /// Everything else of the client specification.
    #[serde(flatten)]
    pub client: ClientSpec,
}

/// A declarative document of either kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum EntityDocument {
    /// A tenant declaration.
    Tenant {
        metadata: Metadata,
        spec: TenantSpec,
        #[serde(flatten)]
        extra: BTreeMap<String, serde_yml::Value>,
    },
    /// A client declaration.
    Client {
        metadata: Metadata,
        spec: ClientDocumentSpec,
        #[serde(flatten)]
        extra: BTreeMap<String, serde_yml::Value>,
    },
}

/// Errors raised while decoding a document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The document is not valid YAML/JSON or misses required fields.
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_yml::Error),

    /// The tenant name is not a valid slug.
    #[error("invalid tenant name: {0}")]
    InvalidName(String),
}

impl EntityDocument {
    /// Parse a document from YAML (or JSON) text.
    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        let document: EntityDocument = serde_yml::from_str(raw)?;
        match &document {
            EntityDocument::Tenant {
                metadata, extra, ..
            }
            | EntityDocument::Client {
                metadata, extra, ..
            } => {
                for key in extra.keys() {
                    if key != "apiVersion" {
                        debug!(
                            "Ignoring unknown field {:?} in document {}",
                            key, metadata.name
                        );
                    }
                }
            }
        }
        Ok(document)
    }

    /// The entity name from the metadata.
    pub fn name(&self) -> &str {
        match self {
            EntityDocument::Tenant { metadata, .. } => &metadata.name,
            EntityDocument::Client { metadata, .. } => &metadata.name,
        }
    }

    /// The control-plane metadata, for reference construction.
    pub fn metadata(&self) -> &Metadata {
        match self {
            EntityDocument::Tenant { metadata, .. } => metadata,
            EntityDocument::Client { metadata, .. } => metadata,
        }
    }

    /// Materialize the document into a domain entity carrying the given
    /// source reference.
    pub fn into_entity(self, reference: EntityRef) -> Result<ParsedEntity, DocumentError> {
        match self {
            EntityDocument::Tenant { metadata, spec, .. } => {
                let tenant = Tenant::new(metadata.name.clone(), reference, spec)
                    .ok_or(DocumentError::InvalidName(metadata.name))?;
                Ok(ParsedEntity::Tenant(tenant))
            }
            EntityDocument::Client { metadata, spec, .. } => Ok(ParsedEntity::Client(Client {
                id: spec.ident,
                name: metadata.name,
                reference,
                spec: spec.client,
            })),
        }
    }
}

/// A parsed document, ready for the store.
#[derive(Debug, Clone)]
pub enum ParsedEntity {
    Tenant(Tenant),
    Client(Client),
}
