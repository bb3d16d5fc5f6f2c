use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::event::Event;

/// Canonical event id: lowercase hex SHA-256 over the serialized array
/// `[0, pubkey, created_at, kind, tags, content]`.
pub fn compute_event_id(
    pubkey: &str,
    created_at: i64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> String {
    let canonical = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an event's id and signature against its claimed author key.
///
/// Returns `false` on any mismatch or malformed field; the relay layer
/// drops such events silently and counts them for diagnostics.
pub fn verify_event(event: &Event) -> bool {
    let expected_id = compute_event_id(
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    );
    if expected_id != event.id {
        return false;
    }

    let Ok(pubkey_bytes) = hex::decode(&event.pubkey) else {
        return false;
    };
    let Ok(pubkey_array) = <[u8; 32]>::try_from(pubkey_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pubkey_array) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(&event.sig) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);

    let Ok(id_bytes) = hex::decode(&event.id) else {
        return false;
    };
    verifying_key.verify(&id_bytes, &signature).is_ok()
}

/// An unsigned event body; signing fills in `id`, `pubkey` and `sig`.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub kind: u32,
    pub created_at: i64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Capability to sign event drafts. Key loading lives with the caller;
/// the engine only ever holds this trait object.
pub trait EventSigner: Send + Sync {
    /// Author key as lowercase hex.
    fn public_key(&self) -> String;

    /// Compute the canonical id and produce a signed event.
    fn sign_event(&self, draft: EventDraft) -> Result<Event>;
}

/// In-process Ed25519 signer.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    signing_key: SigningKey,
}

impl LocalSigner {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let mut secret_bytes: [u8; 32] = [0u8; 32];
        csprng.fill_bytes(&mut secret_bytes);
        Self {
            signing_key: SigningKey::from_bytes(&secret_bytes),
        }
    }

    pub fn from_secret_bytes(secret_bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret_bytes),
        }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex).context("Invalid secret key encoding")?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Invalid secret key length"))?;
        Ok(Self::from_secret_bytes(&array))
    }
}

impl EventSigner for LocalSigner {
    fn public_key(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    fn sign_event(&self, draft: EventDraft) -> Result<Event> {
        let pubkey = self.public_key();
        let id = compute_event_id(
            &pubkey,
            draft.created_at,
            draft.kind,
            &draft.tags,
            &draft.content,
        );
        let id_bytes = hex::decode(&id).context("Invalid event id encoding")?;
        let signature = self.signing_key.sign(&id_bytes);

        Ok(Event {
            id,
            pubkey,
            created_at: draft.created_at,
            kind: draft.kind,
            tags: draft.tags,
            content: draft.content,
            sig: hex::encode(signature.to_bytes()),
        })
    }
}
