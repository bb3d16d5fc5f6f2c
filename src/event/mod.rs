//! Wire data model for the relay network
//!
//! Events are the only thing that crosses the network boundary: attestations,
//! revocations, payment receipts and service results are all signed events
//! distinguished by kind. Typed views (see [`attestation`]) are parsed at the
//! edge; everything past the relay layer operates on typed records.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod attestation;

pub use attestation::{
    attestation_tags, parse_attestation, Attestation, AttestationType, ParseIssue, NAMESPACE,
};

/// Attestation events (NIP-32 style label events)
pub const KIND_ATTESTATION: u32 = 1985;

/// Revocation events (deletion requests)
pub const KIND_REVOCATION: u32 = 5;

/// Payment receipt events (zaps)
pub const KIND_ZAP_RECEIPT: u32 = 9735;

/// Service result kinds occupy [6000, 6999]; the matching request kind is
/// result kind minus this offset.
pub const SERVICE_RESULT_KIND_MIN: u32 = 6000;
pub const SERVICE_RESULT_KIND_MAX: u32 = 6999;
pub const SERVICE_REQUEST_KIND_OFFSET: u32 = 1000;

/// A signed event as it appears on the wire.
///
/// `id` is the lowercase hex SHA-256 of the canonical serialization and
/// `sig` a detached Ed25519 signature over it; both are verified at the
/// relay boundary, never deeper in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// First value of the first tag with the given name.
    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name) && t.len() >= 2)
            .map(|t| t[1].as_str())
    }

    /// All first values of tags with the given name, in tag order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |t| t.first().map(String::as_str) == Some(name) && t.len() >= 2)
            .map(|t| t[1].as_str())
    }

    /// Whether any tag matches the given name and value exactly.
    pub fn has_tag(&self, name: &str, value: &str) -> bool {
        self.tag_values(name).any(|v| v == value)
    }
}

/// Validate a public key: exactly 64 lowercase hex characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() != 64 {
        return Err(anyhow::anyhow!(
            "Invalid key length: expected 64 hex characters, got {}",
            key.len()
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(anyhow::anyhow!(
            "Invalid key: must be lowercase hex, got {:?}",
            key
        ));
    }
    Ok(())
}

/// Event ids share the key encoding (64-hex content hash).
pub fn is_hex_id(id: &str) -> bool {
    validate_key(id).is_ok()
}
