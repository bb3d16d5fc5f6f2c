//! Concurrent relay aggregation
//!
//! Fans subscriptions and publishes out to every configured relay, merges
//! by event id, and joins the result with revocations and payment
//! receipts before handing it to the scoring kernel. Best-effort by
//! design: a failed or slow relay never fails the aggregate.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::RwLock;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::crypto::verify_event;
use crate::event::{
    validate_key, Event, KIND_ATTESTATION, KIND_REVOCATION, KIND_ZAP_RECEIPT, NAMESPACE,
};
use crate::receipts::parse_zap_receipt;
use crate::scoring::{
    all_category_scores, category_score, compute_score, MapResolver, ScoreCategory, ScoreOptions,
    ScoreResult,
};

use super::client::{PublishOutcome, RelayClient, DEFAULT_RELAY_DEADLINE};
use super::protocol::Filter;

/// Headroom the aggregation join gets beyond the per-relay deadline.
const GLOBAL_DEADLINE_HEADROOM: Duration = Duration::from_secs(2);

/// Narrowing options for attestation queries.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Keep attestations whose author has since revoked them.
    pub include_revoked: bool,
    pub since: Option<i64>,
    pub limit: Option<u32>,
}

/// Per-query memo for recursive attester resolution. A placeholder zero
/// score is inserted before recursing so cycles terminate.
type ScoreMemo = Arc<RwLock<HashMap<String, ScoreResult>>>;

/// Aggregates an untrusted relay set into one attestation view.
#[derive(Debug, Clone)]
pub struct RelayAggregator {
    relays: Vec<String>,
    relay_deadline: Duration,
    scoring: ScoreOptions,
}

impl RelayAggregator {
    pub fn new(relays: Vec<String>) -> Self {
        Self {
            relays,
            relay_deadline: DEFAULT_RELAY_DEADLINE,
            scoring: ScoreOptions::default(),
        }
    }

    pub fn with_relay_deadline(mut self, deadline: Duration) -> Self {
        self.relay_deadline = deadline;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoreOptions) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    fn client(&self, relay: &str) -> RelayClient {
        RelayClient::new(relay).with_deadline(self.relay_deadline)
    }

    /// Fan a filter out to every relay and merge by event id. Relays that
    /// miss the global deadline are discarded; partial data is kept.
    async fn fan_out_query(&self, filter: &Filter) -> Vec<Event> {
        let mut pending: FuturesUnordered<_> = self
            .relays
            .iter()
            .map(|relay| {
                let client = self.client(relay);
                let filter = filter.clone();
                async move { (client.url().to_string(), client.fetch_events(&filter).await) }
            })
            .collect();

        let deadline = Instant::now() + self.relay_deadline + GLOBAL_DEADLINE_HEADROOM;
        let mut seen: HashSet<String> = HashSet::new();
        let mut merged: Vec<Event> = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Global aggregation deadline reached, discarding stragglers");
                break;
            }
            match timeout(remaining, pending.next()).await {
                Ok(Some((relay, Ok(events)))) => {
                    debug!(%relay, count = events.len(), "Relay answered");
                    for event in events {
                        if seen.insert(event.id.clone()) {
                            merged.push(event);
                        }
                    }
                }
                Ok(Some((relay, Err(error)))) => {
                    debug!(%relay, %error, "Relay query failed, continuing without it");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("Global aggregation deadline reached, discarding stragglers");
                    break;
                }
            }
        }

        merged
    }

    /// Fetch all attestations about a target: signature-verified, deduped
    /// by id, self-attestations excluded, revoked records removed unless
    /// requested otherwise.
    pub async fn query_attestations(
        &self,
        target: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Event>> {
        validate_key(target)?;

        let filter = Filter {
            kinds: Some(vec![KIND_ATTESTATION]),
            namespaces: Some(vec![NAMESPACE.to_string()]),
            targets: Some(vec![target.to_string()]),
            since: options.since,
            limit: options.limit,
            ..Filter::default()
        };

        let fetched = self.fan_out_query(&filter).await;
        let fetched_count = fetched.len();
        let mut events: Vec<Event> = fetched
            .into_iter()
            .filter(|event| verify_event(event))
            .filter(|event| event.pubkey != target)
            .collect();
        let dropped = fetched_count - events.len();
        if dropped > 0 {
            debug!(
                "Dropped {} attestations (bad signature or self-authored) for {}",
                dropped, target
            );
        }

        if !options.include_revoked && !events.is_empty() {
            let authors: BTreeSet<String> =
                events.iter().map(|event| event.pubkey.clone()).collect();
            let revoked = self.query_revocations(&authors).await;
            if !revoked.is_empty() {
                events.retain(|event| !revoked.contains(&event.id));
            }
        }

        Ok(events)
    }

    /// Collect the ids revoked by the given authors. Only deletion records
    /// carrying the attestation kind reference count, and only from the
    /// authors actually queried; a revocation cannot touch another
    /// author's attestation because the query set is restricted to the
    /// authors present in the bag.
    pub async fn query_revocations(&self, authors: &BTreeSet<String>) -> HashSet<String> {
        if authors.is_empty() {
            return HashSet::new();
        }
        let filter = Filter {
            kinds: Some(vec![KIND_REVOCATION]),
            authors: Some(authors.iter().cloned().collect()),
            ..Filter::default()
        };

        let mut revoked = HashSet::new();
        for event in self.fan_out_query(&filter).await {
            if !verify_event(&event) || !authors.contains(&event.pubkey) {
                continue;
            }
            if !event.has_tag("k", &KIND_ATTESTATION.to_string()) {
                continue;
            }
            for id in event.tag_values("e") {
                revoked.insert(id.to_string());
            }
        }
        revoked
    }

    /// Sum zapped satoshis per attestation id across all payment receipts
    /// referencing the given ids.
    pub async fn query_zap_totals(&self, ids: &[String]) -> HashMap<String, u64> {
        if ids.is_empty() {
            return HashMap::new();
        }
        let filter = Filter {
            kinds: Some(vec![KIND_ZAP_RECEIPT]),
            refs: Some(ids.to_vec()),
            ..Filter::default()
        };
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut totals: HashMap<String, u64> = HashMap::new();
        for event in self.fan_out_query(&filter).await {
            if !verify_event(&event) {
                continue;
            }
            let Some((attestation_id, sats)) = parse_zap_receipt(&event) else {
                continue;
            };
            if wanted.contains(attestation_id.as_str()) {
                *totals.entry(attestation_id).or_insert(0) += sats;
            }
        }
        totals
    }

    /// Publish an event to every relay concurrently. One outcome per
    /// relay; no retries, the caller aggregates.
    pub async fn publish(&self, event: &Event) -> Vec<PublishOutcome> {
        let mut pending: FuturesUnordered<_> = self
            .relays
            .iter()
            .map(|relay| {
                let client = self.client(relay);
                let event = event.clone();
                async move { (client.url().to_string(), client.publish(&event).await) }
            })
            .collect();

        let deadline = Instant::now() + self.relay_deadline + GLOBAL_DEADLINE_HEADROOM;
        let mut outcomes: Vec<PublishOutcome> = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, pending.next()).await {
                Ok(Some((_, Ok(outcome)))) => outcomes.push(outcome),
                Ok(Some((relay, Err(error)))) => outcomes.push(PublishOutcome {
                    relay,
                    accepted: false,
                    reason: Some(error.to_string()),
                }),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        // Relays that never answered still get an outcome row.
        let answered: HashSet<&str> = outcomes.iter().map(|o| o.relay.as_str()).collect();
        let missing: Vec<String> = self
            .relays
            .iter()
            .filter(|relay| !answered.contains(relay.as_str()))
            .cloned()
            .collect();
        for relay in missing {
            outcomes.push(PublishOutcome {
                relay,
                accepted: false,
                reason: Some("deadline exceeded".to_string()),
            });
        }

        info!(
            event_id = %event.id,
            accepted = outcomes.iter().filter(|o| o.accepted).count(),
            total = outcomes.len(),
            "Publish fan-out complete"
        );
        outcomes
    }

    /// Score a target: fetch attestations and zap totals, recursively
    /// resolve attester scores up to the depth budget, run the kernel.
    pub async fn score(&self, target: &str) -> Result<ScoreResult> {
        validate_key(target)?;
        let memo: ScoreMemo = Arc::new(RwLock::new(HashMap::new()));
        Ok(self.score_with_memo(target.to_string(), 0, memo).await)
    }

    /// Score one category slice of a target's bag.
    pub async fn score_category(
        &self,
        target: &str,
        category: &ScoreCategory,
    ) -> Result<ScoreResult> {
        validate_key(target)?;
        let memo: ScoreMemo = Arc::new(RwLock::new(HashMap::new()));
        let (events, zap_totals, attester_scores) = self.gather(target, 0, memo).await;
        Ok(category_score(
            &events,
            &zap_totals,
            category,
            &self.scoring,
            &MapResolver::new(attester_scores),
        ))
    }

    /// Score every named category over one fetched bag.
    pub async fn score_all_categories(
        &self,
        target: &str,
    ) -> Result<HashMap<String, ScoreResult>> {
        validate_key(target)?;
        let memo: ScoreMemo = Arc::new(RwLock::new(HashMap::new()));
        let (events, zap_totals, attester_scores) = self.gather(target, 0, memo).await;
        Ok(all_category_scores(
            &events,
            &zap_totals,
            &self.scoring,
            &MapResolver::new(attester_scores),
        ))
    }

    /// Fetch everything one scoring pass needs: the attestation bag, its
    /// zap totals, and prefetched attester scores so the kernel stays
    /// synchronous.
    async fn gather(
        &self,
        target: &str,
        depth: u32,
        memo: ScoreMemo,
    ) -> (
        Vec<Event>,
        HashMap<String, u64>,
        HashMap<String, ScoreResult>,
    ) {
        let events = match self
            .query_attestations(target, &QueryOptions::default())
            .await
        {
            Ok(events) => events,
            Err(error) => {
                warn!("Attestation query for {} failed ({}), scoring empty bag", target, error);
                Vec::new()
            }
        };

        let ids: Vec<String> = events.iter().map(|event| event.id.clone()).collect();
        let zap_totals = self.query_zap_totals(&ids).await;

        let mut attester_scores: HashMap<String, ScoreResult> = HashMap::new();
        if depth < self.scoring.max_depth {
            let authors: BTreeSet<String> =
                events.iter().map(|event| event.pubkey.clone()).collect();
            for author in authors {
                let score = self
                    .resolve_attester(author.clone(), depth + 1, memo.clone())
                    .await;
                attester_scores.insert(author, score);
            }
        }

        (events, zap_totals, attester_scores)
    }

    fn score_with_memo(
        &self,
        target: String,
        depth: u32,
        memo: ScoreMemo,
    ) -> Pin<Box<dyn Future<Output = ScoreResult> + Send + '_>> {
        Box::pin(async move {
            let (events, zap_totals, attester_scores) = self.gather(&target, depth, memo).await;
            let options = ScoreOptions {
                depth,
                ..self.scoring.clone()
            };
            compute_score(
                &events,
                &zap_totals,
                &options,
                &MapResolver::new(attester_scores),
            )
        })
    }

    async fn resolve_attester(&self, author: String, depth: u32, memo: ScoreMemo) -> ScoreResult {
        {
            let cache = memo.read().await;
            if let Some(cached) = cache.get(&author) {
                return cached.clone();
            }
        }
        // Placeholder before recursing: a cycle back to this author sees a
        // zero score and terminates.
        {
            let mut cache = memo.write().await;
            cache.insert(author.clone(), ScoreResult::empty());
        }

        let result = self
            .score_with_memo(author.clone(), depth, memo.clone())
            .await;

        let mut cache = memo.write().await;
        cache.insert(author, result.clone());
        result
    }
}
