//! Pure scoring engine
//!
//! Deterministic computation over an already-fetched bag of attestations.
//! No I/O, no wall clock unless the caller omits `now`, no dependency on
//! the relay layer.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ attestations │────►│ compute_score      │◄────│ AttesterResolver │
//! │ + zap totals │     │ (kernel.rs)        │     │ (injected)       │
//! └──────────────┘     └───────────────────┘     └──────────────────┘
//!                               │
//!                               ▼
//!                       ┌───────────────────┐
//!                       │ ScoreResult       │
//!                       │ (breakdown +      │
//!                       │  diversity)       │
//!                       └───────────────────┘
//! ```
//!
//! ## Score model
//!
//! - Each record contributes `zap_weight x attester_trust x type
//!   multiplier x decay`, times a novelty bonus on the first attestation
//!   of an (author, target) edge
//! - Negative attestations are gated on empty content and on low-trust
//!   attesters; gated records are recorded but contribute zero
//! - The aggregate is floored at zero and normalised to a 0..=100 display
//!   score

mod category;
mod kernel;

pub use category::{all_category_scores, category_score, ScoreCategory, NAMED_CATEGORIES};
pub use kernel::{
    compute_score, AttesterResolver, BreakdownEntry, ContributionStatus, DiversityMetrics,
    MapResolver, NoAttesterInfo, ScoreOptions, ScoreResult,
};
