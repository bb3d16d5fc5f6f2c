//! Agent Web-of-Trust Engine
//!
//! Decentralized reputation for software agents that identify by public
//! keys on a gossip-style relay network. Peers publish signed attestations
//! about other peers; any observer aggregates them into a trust score and
//! a sybil-resistance metric.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── config.rs      - Configuration management
//! ├── event/         - Wire data model
//! │   ├── mod.rs        - Events, tags, kinds, key validation
//! │   └── attestation.rs - Typed attestation parsing
//! ├── crypto/        - Cryptographic utilities
//! │   └── signing.rs    - Event ids, Ed25519 sign/verify, signer trait
//! ├── scoring/       - Pure scoring engine
//! │   ├── kernel.rs     - Deterministic score computation
//! │   └── category.rs   - Category projections
//! ├── relay/         - Relay aggregation layer
//! │   ├── protocol.rs   - Subscription filters and wire frames
//! │   ├── client.rs     - Per-relay WebSocket operations
//! │   └── aggregator.rs - Concurrent fan-out and joins
//! ├── receipts/      - Receipt construction
//! │   ├── service.rs    - Service-result parsing
//! │   └── zap.rs        - Payment-receipt amounts
//! ├── candidates/    - Pre-publication queue
//! │   ├── store.rs      - State machine and eviction
//! │   └── persist.rs    - JSON file round-trip
//! └── engine.rs      - Orchestrator wiring it all together
//! ```

pub mod candidates;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod event;
pub mod receipts;
pub mod relay;
pub mod scoring;

// Re-export main types for convenience
pub use candidates::{
    Candidate, CandidateEdits, CandidateFilter, CandidateStats, CandidateStatus, CandidateStore,
    CandidateStoreConfig, NewCandidate,
};
pub use config::WotConfig;
pub use crypto::{EventDraft, EventSigner, LocalSigner};
pub use engine::{PublishReport, TrustEngine};
pub use event::{Attestation, AttestationType, Event, NAMESPACE};
pub use receipts::{ReceiptBody, ReceiptOptions, ServiceResult};
pub use relay::{Filter, PublishOutcome, QueryOptions, RelayAggregator, RelayClient};
pub use scoring::{
    compute_score, AttesterResolver, BreakdownEntry, ContributionStatus, DiversityMetrics,
    ScoreCategory, ScoreOptions, ScoreResult,
};
