//! Candidate queue with explicit confirmation
//!
//! Candidates are locally-owned attestation proposals that never leave
//! the process until a human (or policy) confirms them. The store owns
//! the state machine, its eviction and expiry rules, and the persistence
//! and notification callbacks.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::event::{validate_key, AttestationType};

/// Candidate lifecycle.
///
/// ```text
///   pending ──confirm──▶ confirmed ──publish──▶ published (terminal)
///   pending ──reject──▶ rejected (terminal)
///   pending ──time-out──▶ expired (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Confirmed,
    Rejected,
    Published,
    Expired,
}

impl CandidateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Published | Self::Expired)
    }
}

/// A proposed attestation awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Locally generated 16-hex id.
    pub id: String,
    pub status: CandidateStatus,
    pub attestation_type: AttestationType,
    pub target_key: String,
    pub comment: String,
    pub event_ref: Option<String>,
    /// Where the suggestion came from, e.g. "dvm", "l402", "manual".
    pub source: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_event_id: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Input to [`CandidateStore::add`].
#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub attestation_type: AttestationType,
    pub target_key: String,
    pub comment: String,
    pub event_ref: Option<String>,
    pub source: String,
    pub metadata: Value,
}

/// Optional edits applied on confirmation.
#[derive(Debug, Clone, Default)]
pub struct CandidateEdits {
    pub comment: Option<String>,
    pub attestation_type: Option<AttestationType>,
    pub metadata: Option<Value>,
}

/// Listing filter; all fields conjunctive.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub status: Option<CandidateStatus>,
    pub target: Option<String>,
    pub source: Option<String>,
    /// Defaults to 50.
    pub limit: Option<usize>,
}

const DEFAULT_LIST_LIMIT: usize = 50;

/// Per-status counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStats {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub rejected: usize,
    pub published: usize,
    pub expired: usize,
}

/// Synchronous persistence hook; receives the full exported list after
/// every state change. Errors are swallowed so in-memory state stays
/// consistent.
pub type PersistCallback = Box<dyn Fn(&[Candidate]) -> Result<()> + Send + Sync>;

/// Notification hook invoked for every newly added candidate.
pub type NotifyCallback = Box<dyn Fn(&Candidate) + Send + Sync>;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct CandidateStoreConfig {
    /// Pending candidates older than this expire on the next enumeration.
    pub max_age: Duration,
    /// Capacity; adds beyond it evict the oldest terminal (else pending).
    pub max_candidates: usize,
}

impl Default for CandidateStoreConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::hours(24),
            max_candidates: 1_000,
        }
    }
}

/// Durable, ordered queue of proposed attestations.
pub struct CandidateStore {
    config: CandidateStoreConfig,
    candidates: RwLock<Vec<Candidate>>,
    persist: Option<PersistCallback>,
    notify: Option<NotifyCallback>,
}

impl CandidateStore {
    pub fn new(config: CandidateStoreConfig) -> Self {
        Self {
            config,
            candidates: RwLock::new(Vec::new()),
            persist: None,
            notify: None,
        }
    }

    pub fn with_persistence(mut self, persist: PersistCallback) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn with_notification(mut self, notify: NotifyCallback) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Validate and enqueue a new pending candidate.
    pub async fn add(&self, new: NewCandidate) -> Result<Candidate> {
        validate_key(&new.target_key)?;
        if new.comment.trim().is_empty() {
            return Err(anyhow::anyhow!("Candidate comment cannot be empty"));
        }

        let now = Utc::now();
        let candidate = Candidate {
            id: generate_candidate_id(),
            status: CandidateStatus::Pending,
            attestation_type: new.attestation_type,
            target_key: new.target_key,
            comment: new.comment,
            event_ref: new.event_ref,
            source: new.source,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
            published_event_id: None,
            rejection_reason: None,
        };

        {
            let mut candidates = self.candidates.write().await;
            sweep_expired(&mut candidates, self.config.max_age);
            if candidates.len() >= self.config.max_candidates {
                evict_one(&mut candidates);
            }
            candidates.push(candidate.clone());
            self.run_persist(&candidates);
        }

        if let Some(notify) = &self.notify {
            notify(&candidate);
        }
        debug!(id = %candidate.id, source = %candidate.source, "Candidate added");
        Ok(candidate)
    }

    /// List candidates newest-first, with lazy expiry applied.
    pub async fn list(&self, filter: &CandidateFilter) -> Vec<Candidate> {
        let mut candidates = self.candidates.write().await;
        if sweep_expired(&mut candidates, self.config.max_age) {
            self.run_persist(&candidates);
        }

        let mut matched: Vec<Candidate> = candidates
            .iter()
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.target.as_deref().map_or(true, |t| c.target_key == t))
            .filter(|c| filter.source.as_deref().map_or(true, |s| c.source == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT));
        matched
    }

    pub async fn get(&self, id: &str) -> Option<Candidate> {
        let candidates = self.candidates.read().await;
        candidates.iter().find(|c| c.id == id).cloned()
    }

    /// Confirm a pending candidate, applying optional edits. Returns
    /// `None` without mutating anything when the candidate is not pending.
    pub async fn confirm(&self, id: &str, edits: CandidateEdits) -> Option<Candidate> {
        let mut candidates = self.candidates.write().await;
        let candidate = candidates
            .iter_mut()
            .find(|c| c.id == id && c.status == CandidateStatus::Pending)?;

        if let Some(comment) = edits.comment {
            candidate.comment = comment;
        }
        if let Some(attestation_type) = edits.attestation_type {
            candidate.attestation_type = attestation_type;
        }
        if let Some(metadata) = edits.metadata {
            candidate.metadata = metadata;
        }
        candidate.status = CandidateStatus::Confirmed;
        candidate.updated_at = Utc::now();
        let confirmed = candidate.clone();

        self.run_persist(&candidates);
        Some(confirmed)
    }

    /// Reject a pending candidate with a reason.
    pub async fn reject(&self, id: &str, reason: &str) -> Option<Candidate> {
        let mut candidates = self.candidates.write().await;
        let candidate = candidates
            .iter_mut()
            .find(|c| c.id == id && c.status == CandidateStatus::Pending)?;

        candidate.status = CandidateStatus::Rejected;
        candidate.rejection_reason = Some(reason.to_string());
        candidate.updated_at = Utc::now();
        let rejected = candidate.clone();

        self.run_persist(&candidates);
        Some(rejected)
    }

    /// Record a confirmed candidate as published under the given event id.
    pub async fn mark_published(&self, id: &str, event_id: &str) -> Option<Candidate> {
        let mut candidates = self.candidates.write().await;
        let candidate = candidates
            .iter_mut()
            .find(|c| c.id == id && c.status == CandidateStatus::Confirmed)?;

        candidate.status = CandidateStatus::Published;
        candidate.published_event_id = Some(event_id.to_string());
        candidate.updated_at = Utc::now();
        let published = candidate.clone();

        self.run_persist(&candidates);
        Some(published)
    }

    pub async fn stats(&self) -> CandidateStats {
        let mut candidates = self.candidates.write().await;
        if sweep_expired(&mut candidates, self.config.max_age) {
            self.run_persist(&candidates);
        }

        let mut stats = CandidateStats {
            total: candidates.len(),
            ..CandidateStats::default()
        };
        for candidate in candidates.iter() {
            match candidate.status {
                CandidateStatus::Pending => stats.pending += 1,
                CandidateStatus::Confirmed => stats.confirmed += 1,
                CandidateStatus::Rejected => stats.rejected += 1,
                CandidateStatus::Published => stats.published += 1,
                CandidateStatus::Expired => stats.expired += 1,
            }
        }
        stats
    }

    /// Replace the store contents with a previously exported list.
    /// Loaded states are preserved as-is; terminal candidates stay
    /// terminal.
    pub async fn load(&self, loaded: Vec<Candidate>) {
        let mut candidates = self.candidates.write().await;
        let mut seen: HashMap<&str, ()> = HashMap::new();
        let mut deduped: Vec<Candidate> = Vec::with_capacity(loaded.len());
        for candidate in &loaded {
            if seen.insert(candidate.id.as_str(), ()).is_none() {
                deduped.push(candidate.clone());
            }
        }
        *candidates = deduped;
    }

    /// Snapshot of the full store, in insertion order.
    pub async fn export(&self) -> Vec<Candidate> {
        self.candidates.read().await.clone()
    }

    fn run_persist(&self, candidates: &[Candidate]) {
        if let Some(persist) = &self.persist {
            if let Err(error) = persist(candidates) {
                warn!(%error, "Candidate persistence failed, in-memory state kept");
            }
        }
    }
}

/// Move over-age pending candidates to expired. Returns whether anything
/// changed.
fn sweep_expired(candidates: &mut [Candidate], max_age: Duration) -> bool {
    let now = Utc::now();
    let mut changed = false;
    for candidate in candidates.iter_mut() {
        if candidate.status == CandidateStatus::Pending && now - candidate.created_at > max_age {
            candidate.status = CandidateStatus::Expired;
            candidate.updated_at = now;
            changed = true;
        }
    }
    changed
}

/// Evict the oldest terminal candidate, else the oldest pending one.
/// Confirmed candidates are never evicted.
fn evict_one(candidates: &mut Vec<Candidate>) {
    let victim = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.status.is_terminal())
        .min_by_key(|(_, c)| c.created_at)
        .or_else(|| {
            candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.status == CandidateStatus::Pending)
                .min_by_key(|(_, c)| c.created_at)
        })
        .map(|(idx, _)| idx);

    match victim {
        Some(idx) => {
            let evicted = candidates.remove(idx);
            debug!(id = %evicted.id, status = ?evicted.status, "Evicted candidate at capacity");
        }
        None => warn!("Store at capacity with only confirmed candidates, not evicting"),
    }
}

fn generate_candidate_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
