//! Integration tests for the web-of-trust engine
//!
//! These tests verify end-to-end functionality against an in-process mock
//! relay: scoring with revocation and zap joins, publish fan-out, the
//! candidate confirmation workflow, and deadline behaviour for relays
//! that stall.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use wot_engine::{
    AttestationType, Candidate, CandidateEdits, CandidateStatus, CandidateStore,
    CandidateStoreConfig, Event, EventDraft, EventSigner, LocalSigner, NewCandidate,
    QueryOptions, RelayAggregator, ScoreOptions, TrustEngine,
};

// ============================================================================
// Mock Relay
// ============================================================================

/// In-process relay speaking the subscription and publish protocol over a
/// real WebSocket. Stored events are served to matching REQ filters;
/// published events are recorded and acknowledged.
#[derive(Clone)]
struct MockRelay {
    url: String,
    stored: Arc<Mutex<Vec<Event>>>,
    published: Arc<Mutex<Vec<Event>>>,
}

impl MockRelay {
    async fn start(stored: Vec<Event>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let relay = Self {
            url,
            stored: Arc::new(Mutex::new(stored)),
            published: Arc::new(Mutex::new(Vec::new())),
        };

        let accept_relay = relay.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn_relay = accept_relay.clone();
                tokio::spawn(async move {
                    conn_relay.serve_connection(stream).await;
                });
            }
        });
        relay
    }

    async fn serve_connection(&self, stream: TcpStream) {
        let Ok(mut socket) = accept_async(stream).await else {
            return;
        };
        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            let Some(frame_type) = frame.get(0).and_then(Value::as_str) else {
                continue;
            };
            match frame_type {
                "REQ" => {
                    let sub_id = frame[1].as_str().unwrap_or_default().to_string();
                    let filter = frame[2].clone();
                    // Protocol noise first: clients must ignore unknown
                    // frames and notices without dropping the connection.
                    let _ = socket
                        .send(Message::Text(json!(["NOTICE", "mock relay"]).to_string()))
                        .await;
                    let _ = socket
                        .send(Message::Text(json!(["X-CUSTOM", 42]).to_string()))
                        .await;

                    let matching: Vec<Event> = {
                        let stored = self.stored.lock().unwrap();
                        stored
                            .iter()
                            .filter(|event| filter_matches(&filter, event))
                            .cloned()
                            .collect()
                    };
                    for event in matching {
                        let _ = socket
                            .send(Message::Text(json!(["EVENT", &sub_id, event]).to_string()))
                            .await;
                    }
                    let _ = socket
                        .send(Message::Text(json!(["EOSE", &sub_id]).to_string()))
                        .await;
                }
                "EVENT" => {
                    let Ok(event) = serde_json::from_value::<Event>(frame[1].clone()) else {
                        continue;
                    };
                    let id = event.id.clone();
                    self.published.lock().unwrap().push(event);
                    let _ = socket
                        .send(Message::Text(json!(["OK", id, true, ""]).to_string()))
                        .await;
                }
                _ => {}
            }
        }
    }

    fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }
}

fn filter_matches(filter: &Value, event: &Event) -> bool {
    if let Some(kinds) = filter.get("kinds").and_then(Value::as_array) {
        if !kinds
            .iter()
            .filter_map(Value::as_u64)
            .any(|kind| kind == u64::from(event.kind))
        {
            return false;
        }
    }
    if let Some(authors) = filter.get("authors").and_then(Value::as_array) {
        if !authors
            .iter()
            .filter_map(Value::as_str)
            .any(|author| author == event.pubkey)
        {
            return false;
        }
    }
    if let Some(ids) = filter.get("ids").and_then(Value::as_array) {
        if !ids.iter().filter_map(Value::as_str).any(|id| id == event.id) {
            return false;
        }
    }
    if let Some(since) = filter.get("since").and_then(Value::as_i64) {
        if event.created_at < since {
            return false;
        }
    }
    for (filter_key, tag_name) in [("#L", "L"), ("#l", "l"), ("#p", "p"), ("#e", "e")] {
        if let Some(wanted) = filter.get(filter_key).and_then(Value::as_array) {
            let found = wanted.iter().filter_map(Value::as_str).any(|value| {
                event
                    .tags
                    .iter()
                    .any(|tag| tag.len() >= 2 && tag[0] == tag_name && tag[1] == value)
            });
            if !found {
                return false;
            }
        }
    }
    true
}

/// A relay that accepts the WebSocket handshake and then never answers.
async fn start_black_hole_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(mut socket) = accept_async(stream).await else {
                    return;
                };
                // Drain inbound frames forever, never reply.
                while socket.next().await.is_some() {}
            });
        }
    });
    url
}

// ============================================================================
// Test Helpers
// ============================================================================

fn sign_attestation(
    signer: &LocalSigner,
    target: &str,
    attestation_type: AttestationType,
    content: &str,
    created_at: i64,
) -> Event {
    signer
        .sign_event(EventDraft {
            kind: 1985,
            created_at,
            tags: vec![
                vec!["L".to_string(), "ai.wot".to_string()],
                vec![
                    "l".to_string(),
                    attestation_type.as_str().to_string(),
                    "ai.wot".to_string(),
                ],
                vec!["p".to_string(), target.to_string()],
            ],
            content: content.to_string(),
        })
        .unwrap()
}

fn sign_revocation(signer: &LocalSigner, attestation_id: &str, created_at: i64) -> Event {
    signer
        .sign_event(EventDraft {
            kind: 5,
            created_at,
            tags: vec![
                vec!["e".to_string(), attestation_id.to_string()],
                vec!["k".to_string(), "1985".to_string()],
            ],
            content: "published by mistake".to_string(),
        })
        .unwrap()
}

fn sign_zap_receipt(
    signer: &LocalSigner,
    attestation_id: &str,
    millisats: u64,
    created_at: i64,
) -> Event {
    let description = json!({
        "kind": 9734,
        "tags": [["amount", millisats.to_string()]],
    })
    .to_string();
    signer
        .sign_event(EventDraft {
            kind: 9735,
            created_at,
            tags: vec![
                vec!["e".to_string(), attestation_id.to_string()],
                vec!["description".to_string(), description],
            ],
            content: String::new(),
        })
        .unwrap()
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn aggregator_for(urls: Vec<String>) -> RelayAggregator {
    RelayAggregator::new(urls)
        .with_relay_deadline(Duration::from_secs(3))
        .with_scoring(ScoreOptions::default())
}

fn store() -> CandidateStore {
    CandidateStore::new(CandidateStoreConfig::default())
}

// ============================================================================
// Scoring over the Relay Layer
// ============================================================================

mod scoring_flow {
    use super::*;

    #[tokio::test]
    async fn test_score_single_attestation_end_to_end() {
        let attester = LocalSigner::generate();
        let target = LocalSigner::generate().public_key();
        let attestation = sign_attestation(
            &attester,
            &target,
            AttestationType::ServiceQuality,
            "delivered exactly what was asked",
            now_secs(),
        );

        let relay = MockRelay::start(vec![attestation]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);

        let result = aggregator.score(&target).await.unwrap();
        // 1.5 type multiplier x 1.3 novelty, fresh enough that decay
        // rounds away
        assert_eq!(result.raw, 1.95);
        assert_eq!(result.positive_count, 1);
        assert_eq!(result.attestation_count, 1);
        assert_eq!(result.diversity.unique_attesters, 1);
    }

    #[tokio::test]
    async fn test_unknown_target_scores_zero() {
        let relay = MockRelay::start(vec![]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);
        let target = LocalSigner::generate().public_key();

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.raw, 0.0);
        assert_eq!(result.display, 0);
        assert_eq!(result.attestation_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_target_key_is_rejected() {
        let relay = MockRelay::start(vec![]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);
        assert!(aggregator.score("not-a-key").await.is_err());
    }

    #[tokio::test]
    async fn test_revocation_erases_attestation() {
        let attester = LocalSigner::generate();
        let target = LocalSigner::generate().public_key();
        let attestation = sign_attestation(
            &attester,
            &target,
            AttestationType::ServiceQuality,
            "great",
            now_secs(),
        );
        let revocation = sign_revocation(&attester, &attestation.id, now_secs());

        let relay = MockRelay::start(vec![attestation, revocation]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.raw, 0.0);
        assert_eq!(result.attestation_count, 0);

        // With include_revoked the record is visible again.
        let events = aggregator
            .query_attestations(
                &target,
                &QueryOptions {
                    include_revoked: true,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_self_attestation_excluded() {
        let target_signer = LocalSigner::generate();
        let target = target_signer.public_key();
        let honest = LocalSigner::generate();

        let self_praise = sign_attestation(
            &target_signer,
            &target,
            AttestationType::ServiceQuality,
            "I am great",
            now_secs(),
        );
        let external = sign_attestation(
            &honest,
            &target,
            AttestationType::GeneralTrust,
            "reliable",
            now_secs(),
        );

        let relay = MockRelay::start(vec![self_praise, external]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.attestation_count, 1);
        assert_eq!(result.breakdown[0].author, honest.public_key());
    }

    #[tokio::test]
    async fn test_forged_signature_dropped() {
        let attester = LocalSigner::generate();
        let target = LocalSigner::generate().public_key();
        let mut forged = sign_attestation(
            &attester,
            &target,
            AttestationType::ServiceQuality,
            "fake praise",
            now_secs(),
        );
        forged.content = "inflated praise".to_string();

        let relay = MockRelay::start(vec![forged]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.attestation_count, 0);
        assert_eq!(result.raw, 0.0);
    }

    #[tokio::test]
    async fn test_zap_receipts_raise_weight() {
        let attester = LocalSigner::generate();
        let zapper = LocalSigner::generate();
        let target = LocalSigner::generate().public_key();
        let attestation = sign_attestation(
            &attester,
            &target,
            AttestationType::ServiceQuality,
            "worth paying for",
            now_secs(),
        );
        let zap = sign_zap_receipt(&zapper, &attestation.id, 21_000_000, now_secs());

        let relay = MockRelay::start(vec![attestation, zap]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.breakdown[0].zap_sats, 21_000);
        assert!(result.breakdown[0].zap_weight > 1.0);
        assert!(result.raw > 1.95);
    }

    #[tokio::test]
    async fn test_attester_reputation_feeds_recursion() {
        let attester = LocalSigner::generate();
        let attester_key = attester.public_key();
        let endorser = LocalSigner::generate();
        let target = LocalSigner::generate().public_key();

        // The attester has reputation of their own, so their attestation
        // about the target carries amplified weight (sqrt of raw > 1).
        let about_attester = sign_attestation(
            &endorser,
            &attester_key,
            AttestationType::ServiceQuality,
            "trusted reviewer",
            now_secs(),
        );
        let about_target = sign_attestation(
            &attester,
            &target,
            AttestationType::ServiceQuality,
            "good work",
            now_secs(),
        );

        let relay = MockRelay::start(vec![about_attester, about_target]).await;
        let aggregator = aggregator_for(vec![relay.url.clone()]);

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.attestation_count, 1);
        // attester raw ~= 1.95, trust = sqrt(1.95) ~= 1.4
        assert!(result.breakdown[0].attester_trust > 1.3);
        assert!(result.raw > 1.95);
    }

    #[tokio::test]
    async fn test_two_relays_merge_by_event_id() {
        let attester_a = LocalSigner::generate();
        let attester_b = LocalSigner::generate();
        let target = LocalSigner::generate().public_key();
        let shared = sign_attestation(
            &attester_a,
            &target,
            AttestationType::ServiceQuality,
            "on both relays",
            now_secs(),
        );
        let only_second = sign_attestation(
            &attester_b,
            &target,
            AttestationType::GeneralTrust,
            "on one relay",
            now_secs(),
        );

        let relay_one = MockRelay::start(vec![shared.clone()]).await;
        let relay_two = MockRelay::start(vec![shared, only_second]).await;
        let aggregator = aggregator_for(vec![relay_one.url.clone(), relay_two.url.clone()]);

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.attestation_count, 2);
        assert_eq!(result.diversity.unique_attesters, 2);
    }

    #[tokio::test]
    async fn test_stalled_relay_does_not_fail_aggregate() {
        let attester = LocalSigner::generate();
        let target = LocalSigner::generate().public_key();
        let attestation = sign_attestation(
            &attester,
            &target,
            AttestationType::ServiceQuality,
            "still arrives",
            now_secs(),
        );

        let good = MockRelay::start(vec![attestation]).await;
        let black_hole = start_black_hole_relay().await;
        let aggregator = RelayAggregator::new(vec![black_hole, good.url.clone()])
            .with_relay_deadline(Duration::from_millis(500));

        let result = aggregator.score(&target).await.unwrap();
        assert_eq!(result.attestation_count, 1);
    }
}

// ============================================================================
// Publish Flows
// ============================================================================

mod publish_flow {
    use super::*;

    #[tokio::test]
    async fn test_publish_attestation_end_to_end() {
        let relay = MockRelay::start(vec![]).await;
        let signer = Arc::new(LocalSigner::generate());
        let engine = TrustEngine::new(aggregator_for(vec![relay.url.clone()]), store())
            .with_signer(signer.clone());
        let target = LocalSigner::generate().public_key();

        let report = engine
            .publish_attestation(
                AttestationType::WorkCompleted,
                &target,
                "shipped the feature",
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.accepted_count(), 1);
        let published = relay.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, report.event.id);
        assert_eq!(published[0].pubkey, signer.public_key());
        // Carries the advisory expiration tag.
        assert!(published[0].tags.iter().any(|t| t[0] == "expiration"));
    }

    #[tokio::test]
    async fn test_revoke_publishes_kind_5() {
        let relay = MockRelay::start(vec![]).await;
        let engine = TrustEngine::new(aggregator_for(vec![relay.url.clone()]), store())
            .with_signer(Arc::new(LocalSigner::generate()));

        let attestation_id = "a".repeat(64);
        let report = engine
            .revoke(&attestation_id, "no longer stand behind this")
            .await
            .unwrap();
        assert_eq!(report.accepted_count(), 1);

        let published = relay.published();
        assert_eq!(published[0].kind, 5);
        assert!(published[0]
            .tags
            .contains(&vec!["e".to_string(), attestation_id]));
        assert!(published[0]
            .tags
            .contains(&vec!["k".to_string(), "1985".to_string()]));
    }

    #[tokio::test]
    async fn test_publish_receipt_from_service_result() {
        let relay = MockRelay::start(vec![]).await;
        let engine = TrustEngine::new(aggregator_for(vec![relay.url.clone()]), store())
            .with_signer(Arc::new(LocalSigner::generate()));

        let provider = LocalSigner::generate();
        let service_result = provider
            .sign_event(EventDraft {
                kind: 6050,
                created_at: now_secs(),
                tags: vec![vec!["amount".to_string(), "21000".to_string()]],
                content: "{}".to_string(),
            })
            .unwrap();

        let report = engine
            .publish_receipt(&service_result, &Default::default())
            .await
            .unwrap();

        let published = relay.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].content.starts_with("DVM receipt"));
        assert!(published[0].content.contains("21 sats"));
        assert!(published[0]
            .tags
            .contains(&vec!["p".to_string(), provider.public_key()]));
        assert_eq!(report.event.kind, 1985);
    }
}

// ============================================================================
// Candidate Workflow
// ============================================================================

mod candidate_flow {
    use super::*;

    fn manual_candidate(target: &str) -> NewCandidate {
        NewCandidate {
            attestation_type: AttestationType::ServiceQuality,
            target_key: target.to_string(),
            comment: "delivered the goods".to_string(),
            event_ref: None,
            source: "manual".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_confirm_and_publish_full_lifecycle() {
        let relay = MockRelay::start(vec![]).await;
        let engine = TrustEngine::new(aggregator_for(vec![relay.url.clone()]), store())
            .with_signer(Arc::new(LocalSigner::generate()));
        let target = LocalSigner::generate().public_key();

        let added = engine.store().add(manual_candidate(&target)).await.unwrap();
        assert_eq!(added.status, CandidateStatus::Pending);

        let published: Candidate = engine
            .confirm_and_publish(
                &added.id,
                CandidateEdits {
                    comment: Some("delivered, with edits".to_string()),
                    ..CandidateEdits::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(published.status, CandidateStatus::Published);
        let event_id = published.published_event_id.clone().unwrap();
        let relayed = relay.published();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].id, event_id);
        assert_eq!(relayed[0].content, "delivered, with edits");

        // Terminal: a second confirmation attempt is not applicable.
        assert!(engine
            .confirm_and_publish(&added.id, CandidateEdits::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_suggested_receipt_candidate_then_publish_all() {
        let relay = MockRelay::start(vec![]).await;
        let engine = TrustEngine::new(aggregator_for(vec![relay.url.clone()]), store())
            .with_signer(Arc::new(LocalSigner::generate()));

        let provider = LocalSigner::generate();
        let service_result = provider
            .sign_event(EventDraft {
                kind: 6100,
                created_at: now_secs(),
                tags: vec![vec!["amount".to_string(), "5000".to_string()]],
                content: "{}".to_string(),
            })
            .unwrap();

        let candidate = engine
            .suggest_from_service_result(&service_result, "dvm", &Default::default())
            .await
            .unwrap();
        assert_eq!(candidate.source, "dvm");

        engine
            .store()
            .confirm(&candidate.id, CandidateEdits::default())
            .await
            .unwrap();

        let results = engine.publish_all_confirmed().await;
        assert_eq!(results.len(), 1);
        let published = results[0].1.as_ref().unwrap();
        assert_eq!(published.status, CandidateStatus::Published);
        assert_eq!(relay.published().len(), 1);
    }
}
