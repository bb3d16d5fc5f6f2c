//! Trust engine orchestrator
//!
//! The only module that sees all three layers: it wires the relay
//! aggregator, the candidate store and an injected signer into the
//! publish and confirmation flows. The kernel and the store never learn
//! about relays; composition happens here.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::candidates::{
    Candidate, CandidateEdits, CandidateFilter, CandidateStatus, CandidateStore, NewCandidate,
};
use crate::crypto::{EventDraft, EventSigner};
use crate::event::{
    attestation_tags, is_hex_id, validate_key, AttestationType, Event, KIND_ATTESTATION,
    KIND_REVOCATION,
};
use crate::receipts::{build_receipt_body, parse_service_result, ReceiptOptions};
use crate::relay::{PublishOutcome, RelayAggregator};
use crate::scoring::{ScoreCategory, ScoreResult};

/// Advisory lifetime stamped on published attestations.
const DEFAULT_EXPIRATION_SECS: i64 = 90 * 86_400;

/// A signed event together with its per-relay publish outcomes.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub event: Event,
    pub outcomes: Vec<PublishOutcome>,
}

impl PublishReport {
    pub fn accepted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.accepted).count()
    }
}

/// Composes scoring, publishing and the candidate workflow.
pub struct TrustEngine {
    aggregator: RelayAggregator,
    store: CandidateStore,
    signer: Option<Arc<dyn EventSigner>>,
}

impl TrustEngine {
    pub fn new(aggregator: RelayAggregator, store: CandidateStore) -> Self {
        Self {
            aggregator,
            store,
            signer: None,
        }
    }

    /// Wire an engine from a validated configuration: aggregator over the
    /// configured relay set, candidate store with optional file
    /// persistence.
    pub fn from_config(config: &crate::config::WotConfig) -> Result<Self> {
        config.validate()?;
        let aggregator = RelayAggregator::new(config.relays.urls.clone())
            .with_relay_deadline(config.relay_deadline())
            .with_scoring(config.score_options());

        let mut store = CandidateStore::new(config.candidate_store_config());
        if let Some(path) = &config.candidates.store_path {
            store = store.with_persistence(crate::candidates::file_persistence(path.into()));
        }

        Ok(Self::new(aggregator, store))
    }

    pub fn with_signer(mut self, signer: Arc<dyn EventSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn aggregator(&self) -> &RelayAggregator {
        &self.aggregator
    }

    pub fn store(&self) -> &CandidateStore {
        &self.store
    }

    pub async fn score(&self, target: &str) -> Result<ScoreResult> {
        self.aggregator.score(target).await
    }

    pub async fn category_score(
        &self,
        target: &str,
        category: &ScoreCategory,
    ) -> Result<ScoreResult> {
        self.aggregator.score_category(target, category).await
    }

    pub async fn all_category_scores(&self, target: &str) -> Result<HashMap<String, ScoreResult>> {
        self.aggregator.score_all_categories(target).await
    }

    /// Sign and publish an attestation about a target.
    ///
    /// Fails on invalid input, on a missing signer, and when every relay
    /// rejects or times out; partial acceptance is success.
    pub async fn publish_attestation(
        &self,
        attestation_type: AttestationType,
        target: &str,
        comment: &str,
        event_ref: Option<&str>,
    ) -> Result<PublishReport> {
        validate_key(target)?;
        if attestation_type.is_negative() && comment.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Negative attestations require a non-empty comment"
            ));
        }

        let event = self.sign(attestation_draft(attestation_type, target, comment, event_ref))?;
        self.publish_event(event).await
    }

    /// Build and publish a revocation of a prior attestation.
    pub async fn revoke(&self, attestation_id: &str, reason: &str) -> Result<PublishReport> {
        if !is_hex_id(attestation_id) {
            return Err(anyhow::anyhow!(
                "Invalid attestation id: {attestation_id:?}"
            ));
        }
        if reason.trim().is_empty() {
            return Err(anyhow::anyhow!("Revocations require a non-empty reason"));
        }

        let draft = EventDraft {
            kind: KIND_REVOCATION,
            created_at: Utc::now().timestamp(),
            tags: vec![
                vec!["e".to_string(), attestation_id.to_string()],
                vec!["k".to_string(), KIND_ATTESTATION.to_string()],
            ],
            content: reason.trim().to_string(),
        };
        let event = self.sign(draft)?;
        self.publish_event(event).await
    }

    /// Construct and publish a receipt attestation from a service result.
    pub async fn publish_receipt(
        &self,
        service_result_event: &Event,
        options: &ReceiptOptions,
    ) -> Result<PublishReport> {
        let service_result = parse_service_result(service_result_event)
            .ok_or_else(|| anyhow::anyhow!("Event is not a service result"))?;
        let body = build_receipt_body(&service_result, options)?;

        let mut tags = body.tags.clone();
        tags.push(expiration_tag());
        let event = self.sign(EventDraft {
            kind: KIND_ATTESTATION,
            created_at: Utc::now().timestamp(),
            tags,
            content: body.comment.clone(),
        })?;
        self.publish_event(event).await
    }

    /// Boundary composition of the receipt watcher: parse a service
    /// result and enqueue a pending candidate instead of publishing
    /// directly.
    pub async fn suggest_from_service_result(
        &self,
        service_result_event: &Event,
        source: &str,
        options: &ReceiptOptions,
    ) -> Result<Candidate> {
        let service_result = parse_service_result(service_result_event)
            .ok_or_else(|| anyhow::anyhow!("Event is not a service result"))?;
        let body = build_receipt_body(&service_result, options)?;

        self.store
            .add(NewCandidate {
                attestation_type: body.attestation_type,
                target_key: body.target,
                comment: body.comment,
                event_ref: Some(body.event_ref),
                source: source.to_string(),
                metadata: json!({
                    "request_kind": service_result.request_kind,
                    "amount_sats": service_result.amount_sats,
                }),
            })
            .await
    }

    /// Confirm a pending candidate and publish it in one step. A failed
    /// publish leaves the candidate in `confirmed` for a retry.
    pub async fn confirm_and_publish(
        &self,
        candidate_id: &str,
        edits: CandidateEdits,
    ) -> Result<Candidate> {
        let confirmed = self
            .store
            .confirm(candidate_id, edits)
            .await
            .ok_or_else(|| anyhow::anyhow!("Candidate {candidate_id} is not pending"))?;

        self.publish_confirmed(&confirmed).await
    }

    /// Publish every confirmed candidate; per-candidate failures are
    /// returned alongside the successes, never propagated.
    pub async fn publish_all_confirmed(&self) -> Vec<(String, Result<Candidate>)> {
        let confirmed = self
            .store
            .list(&CandidateFilter {
                status: Some(CandidateStatus::Confirmed),
                limit: Some(usize::MAX),
                ..CandidateFilter::default()
            })
            .await;

        let mut results = Vec::with_capacity(confirmed.len());
        for candidate in confirmed {
            let id = candidate.id.clone();
            let result = self.publish_confirmed(&candidate).await;
            if let Err(error) = &result {
                warn!(candidate_id = %id, %error, "Candidate publish failed, left confirmed");
            }
            results.push((id, result));
        }
        results
    }

    async fn publish_confirmed(&self, candidate: &Candidate) -> Result<Candidate> {
        if candidate.attestation_type.is_negative() && candidate.comment.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Negative attestations require a non-empty comment"
            ));
        }
        let event = self.sign(attestation_draft(
            candidate.attestation_type,
            &candidate.target_key,
            &candidate.comment,
            candidate.event_ref.as_deref(),
        ))?;
        let report = self.publish_event(event).await?;

        self.store
            .mark_published(&candidate.id, &report.event.id)
            .await
            .ok_or_else(|| {
                anyhow::anyhow!("Candidate {} left confirmed state mid-publish", candidate.id)
            })
    }

    fn sign(&self, draft: EventDraft) -> Result<Event> {
        let signer = self
            .signer
            .as_ref()
            .context("No signer configured for publish operations")?;
        signer.sign_event(draft)
    }

    async fn publish_event(&self, event: Event) -> Result<PublishReport> {
        let outcomes = self.aggregator.publish(&event).await;
        let accepted = outcomes.iter().filter(|o| o.accepted).count();
        if accepted == 0 {
            return Err(anyhow::anyhow!(
                "Event {} was rejected or timed out on all {} relays",
                event.id,
                outcomes.len()
            ));
        }
        info!(
            event_id = %event.id,
            accepted = accepted,
            total = outcomes.len(),
            "Event published"
        );
        Ok(PublishReport { event, outcomes })
    }
}

fn attestation_draft(
    attestation_type: AttestationType,
    target: &str,
    comment: &str,
    event_ref: Option<&str>,
) -> EventDraft {
    let now = Utc::now().timestamp();
    let mut tags = attestation_tags(attestation_type, target, event_ref);
    tags.push(expiration_tag_at(now));
    EventDraft {
        kind: KIND_ATTESTATION,
        created_at: now,
        tags,
        content: comment.to_string(),
    }
}

fn expiration_tag() -> Vec<String> {
    expiration_tag_at(Utc::now().timestamp())
}

fn expiration_tag_at(now: i64) -> Vec<String> {
    vec![
        "expiration".to_string(),
        (now + DEFAULT_EXPIRATION_SECS).to_string(),
    ]
}
