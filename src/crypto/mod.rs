//! Cryptographic utilities for the trust engine
//!
//! Provides canonical event-id hashing, Ed25519 signing and verification,
//! and the signer capability the engine injects into publish flows.

pub mod signing;

pub use signing::{
    compute_event_id, verify_event, EventDraft, EventSigner, LocalSigner,
};
