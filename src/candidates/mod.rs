//! Candidate queue
//!
//! A bounded, persisted queue of proposed attestations with a strict
//! pending → confirmed → published state machine and human-in-the-loop
//! confirmation. Nothing here touches the network; publishing is wired
//! up by the engine.

pub mod persist;
pub mod store;

pub use persist::{file_persistence, load_candidates, save_candidates};
pub use store::{
    Candidate, CandidateEdits, CandidateFilter, CandidateStats, CandidateStatus, CandidateStore,
    CandidateStoreConfig, NewCandidate, NotifyCallback, PersistCallback,
};
