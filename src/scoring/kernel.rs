//! Deterministic score computation
//!
//! The kernel is total and side-effect free: every input bag yields a
//! well-formed [`ScoreResult`], with malformed records recorded in the
//! breakdown rather than surfaced as errors. Attester recursion happens
//! behind the injected [`AttesterResolver`] capability so the kernel
//! itself never touches the network.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::{parse_attestation, Attestation, AttestationType, Event};

/// Seconds per day, used for decay.
const SECS_PER_DAY: f64 = 86_400.0;

/// Scoring configuration. `now` is injected wherever decay is computed;
/// tests supply fixed values, callers that omit it get the wall clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOptions {
    /// Half-life of an attestation's weight, in days.
    pub half_life_days: f64,
    /// Current recursion depth (0 at the root query).
    pub depth: u32,
    /// Depth at which attesters are assumed trusted instead of resolved.
    pub max_depth: u32,
    /// Display-score threshold below which negative attestations are gated.
    pub negative_trust_gate: u32,
    /// Collapse repeat (author, target, type) records to the newest.
    pub deduplicate: bool,
    /// Bonus multiplier for the first attestation on an edge.
    pub novelty_multiplier: f64,
    /// Unix seconds; `None` means wall clock.
    pub now: Option<i64>,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            half_life_days: 90.0,
            depth: 0,
            max_depth: 2,
            negative_trust_gate: 20,
            deduplicate: true,
            novelty_multiplier: 1.3,
            now: None,
        }
    }
}

/// Capability to resolve an attester's own score during recursion.
///
/// The relay layer prefetches attester scores asynchronously and hands the
/// kernel a map-backed implementation, keeping the kernel synchronous.
pub trait AttesterResolver {
    fn resolve(&self, author: &str) -> ScoreResult;
}

/// Resolver with no information: every attester scores zero, which the
/// kernel dampens to neutral trust for positive attestations.
pub struct NoAttesterInfo;

impl AttesterResolver for NoAttesterInfo {
    fn resolve(&self, _author: &str) -> ScoreResult {
        ScoreResult::empty()
    }
}

/// Map-backed resolver; unknown authors fall back to the empty score.
pub struct MapResolver {
    scores: HashMap<String, ScoreResult>,
}

impl MapResolver {
    pub fn new(scores: HashMap<String, ScoreResult>) -> Self {
        Self { scores }
    }
}

impl AttesterResolver for MapResolver {
    fn resolve(&self, author: &str) -> ScoreResult {
        self.scores.get(author).cloned().unwrap_or_else(ScoreResult::empty)
    }
}

/// Why a breakdown entry did or did not contribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContributionStatus {
    /// Contributed its full weight.
    Counted,
    /// Recognised but policy-gated; contribution forced to zero.
    Gated { reason: String },
    /// Did not parse to a recognised attestation.
    Skipped { reason: String },
}

/// Per-record provenance for one scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub event_id: String,
    pub author: String,
    pub attestation_type: Option<AttestationType>,
    pub created_at: i64,
    pub zap_sats: u64,
    pub zap_weight: f64,
    pub decay: f64,
    pub attester_trust: f64,
    pub novel: bool,
    pub contribution: f64,
    #[serde(flatten)]
    pub outcome: ContributionStatus,
}

/// Distribution of positive contributions across attesters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityMetrics {
    /// 0 = concentrated on one attester, 1 = maximally spread.
    pub diversity: f64,
    pub unique_attesters: usize,
    pub max_attester_share: f64,
    pub top_attester: Option<String>,
}

impl DiversityMetrics {
    pub fn zero() -> Self {
        Self {
            diversity: 0.0,
            unique_attesters: 0,
            max_attester_share: 0.0,
            top_attester: None,
        }
    }
}

/// Aggregate trust score for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Non-negative sum of contributions, rounded to 1/100.
    pub raw: f64,
    /// Integer display score in 0..=100.
    pub display: u32,
    /// Records accepted into scoring, gated included.
    pub attestation_count: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub gated_count: usize,
    pub breakdown: Vec<BreakdownEntry>,
    pub diversity: DiversityMetrics,
}

impl ScoreResult {
    pub fn empty() -> Self {
        Self {
            raw: 0.0,
            display: 0,
            attestation_count: 0,
            positive_count: 0,
            negative_count: 0,
            gated_count: 0,
            breakdown: Vec::new(),
            diversity: DiversityMetrics::zero(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn zap_weight(zap_sats: u64) -> f64 {
    if zap_sats == 0 {
        return 1.0;
    }
    1.0 + (1.0 + zap_sats as f64).log2() * 0.5
}

fn decay_factor(created_at: i64, now: i64, half_life_days: f64) -> f64 {
    let age_days = (now - created_at).max(0) as f64 / SECS_PER_DAY;
    0.5_f64.powf(age_days / half_life_days)
}

/// Compute the trust score for one target from an already-fetched bag of
/// events and a per-attestation zap total map.
pub fn compute_score(
    events: &[Event],
    zap_totals: &HashMap<String, u64>,
    options: &ScoreOptions,
    resolver: &dyn AttesterResolver,
) -> ScoreResult {
    let now = options
        .now
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    // Parse at the edge; parse failures stay in the breakdown as skipped.
    let mut parsed: Vec<Attestation> = Vec::new();
    let mut skipped: Vec<BreakdownEntry> = Vec::new();
    for event in events {
        match parse_attestation(event) {
            Ok(att) => parsed.push(att),
            Err(issue) => skipped.push(BreakdownEntry {
                event_id: event.id.clone(),
                author: event.pubkey.clone(),
                attestation_type: None,
                created_at: event.created_at,
                zap_sats: 0,
                zap_weight: 0.0,
                decay: 0.0,
                attester_trust: 0.0,
                novel: false,
                contribution: 0.0,
                outcome: ContributionStatus::Skipped {
                    reason: issue.to_string(),
                },
            }),
        }
    }

    // Novelty index over the original (pre-dedup) bag: the earliest
    // created_at per (author, target) edge.
    let mut earliest: HashMap<(&str, &str), i64> = HashMap::new();
    for att in &parsed {
        earliest
            .entry((att.author.as_str(), att.target.as_str()))
            .and_modify(|t| *t = (*t).min(att.created_at))
            .or_insert(att.created_at);
    }

    // Deduplicate by (author, target, type), keeping the newest record;
    // ties break to the lexicographically greater id.
    let survivors: Vec<&Attestation> = if options.deduplicate {
        let mut best: HashMap<(&str, &str, AttestationType), usize> = HashMap::new();
        for (idx, att) in parsed.iter().enumerate() {
            let key = (att.author.as_str(), att.target.as_str(), att.kind);
            match best.get(&key) {
                Some(&prev) => {
                    let incumbent = &parsed[prev];
                    let newer = (att.created_at, att.event_id.as_str())
                        > (incumbent.created_at, incumbent.event_id.as_str());
                    if newer {
                        best.insert(key, idx);
                    }
                }
                None => {
                    best.insert(key, idx);
                }
            }
        }
        let keep: std::collections::HashSet<usize> = best.into_values().collect();
        parsed
            .iter()
            .enumerate()
            .filter(|(idx, _)| keep.contains(idx))
            .map(|(_, att)| att)
            .collect()
    } else {
        parsed.iter().collect()
    };

    // One resolver call per distinct author.
    let mut trust_cache: HashMap<&str, (f64, u32)> = HashMap::new();

    let mut breakdown: Vec<BreakdownEntry> = Vec::new();
    let mut sum = 0.0;
    let mut positive_count = 0;
    let mut negative_count = 0;
    let mut gated_count = 0;

    for att in survivors {
        let zap_sats = zap_totals.get(&att.event_id).copied().unwrap_or(0);
        let weight = zap_weight(zap_sats);
        let decay = decay_factor(att.created_at, now, options.half_life_days);
        let novel = earliest
            .get(&(att.author.as_str(), att.target.as_str()))
            .is_some_and(|&t| t == att.created_at);

        // Negative attestations without substance never count.
        if att.kind.is_negative() && att.content.trim().is_empty() {
            gated_count += 1;
            breakdown.push(BreakdownEntry {
                event_id: att.event_id.clone(),
                author: att.author.clone(),
                attestation_type: Some(att.kind),
                created_at: att.created_at,
                zap_sats,
                zap_weight: weight,
                decay,
                attester_trust: 0.0,
                novel,
                contribution: 0.0,
                outcome: ContributionStatus::Gated {
                    reason: "empty content".to_string(),
                },
            });
            continue;
        }

        let (attester_trust, attester_display) = if options.depth < options.max_depth {
            *trust_cache.entry(att.author.as_str()).or_insert_with(|| {
                let resolved = resolver.resolve(&att.author);
                let trust = if resolved.raw > 0.0 {
                    resolved.raw.sqrt()
                } else {
                    1.0
                };
                (trust, resolved.display)
            })
        } else {
            // At the depth budget attesters are assumed trusted enough to
            // escape the negative gate.
            (1.0, 100)
        };

        if att.kind.is_negative() && attester_display < options.negative_trust_gate {
            gated_count += 1;
            breakdown.push(BreakdownEntry {
                event_id: att.event_id.clone(),
                author: att.author.clone(),
                attestation_type: Some(att.kind),
                created_at: att.created_at,
                zap_sats,
                zap_weight: weight,
                decay,
                attester_trust,
                novel,
                contribution: 0.0,
                outcome: ContributionStatus::Gated {
                    reason: format!(
                        "attester trust {} < gate {}",
                        attester_display, options.negative_trust_gate
                    ),
                },
            });
            continue;
        }

        let mut contribution = weight * attester_trust * att.kind.multiplier() * decay;
        if novel {
            contribution *= options.novelty_multiplier;
        }

        sum += contribution;
        if contribution > 0.0 {
            positive_count += 1;
        } else if contribution < 0.0 {
            negative_count += 1;
        }
        breakdown.push(BreakdownEntry {
            event_id: att.event_id.clone(),
            author: att.author.clone(),
            attestation_type: Some(att.kind),
            created_at: att.created_at,
            zap_sats,
            zap_weight: weight,
            decay,
            attester_trust,
            novel,
            contribution,
            outcome: ContributionStatus::Counted,
        });
    }

    let attestation_count = breakdown
        .iter()
        .filter(|e| !matches!(e.outcome, ContributionStatus::Skipped { .. }))
        .count();

    let diversity = diversity_metrics(&breakdown);

    // Display is derived from the unrounded floored sum; raw is the same
    // sum rounded to 1/100.
    let floored = sum.max(0.0);
    breakdown.extend(skipped);
    ScoreResult {
        raw: round2(floored),
        display: ((floored * 10.0).round() as u32).min(100),
        attestation_count,
        positive_count,
        negative_count,
        gated_count,
        breakdown,
        diversity,
    }
}

fn diversity_metrics(breakdown: &[BreakdownEntry]) -> DiversityMetrics {
    let positives: Vec<&BreakdownEntry> = breakdown
        .iter()
        .filter(|e| matches!(e.outcome, ContributionStatus::Counted) && e.contribution > 0.0)
        .collect();
    if positives.is_empty() {
        return DiversityMetrics::zero();
    }

    let total: f64 = positives.iter().map(|e| e.contribution).sum();
    // Per-author sums in first-seen order so share ties break stably.
    let mut order: Vec<&str> = Vec::new();
    let mut per_author: HashMap<&str, f64> = HashMap::new();
    for entry in &positives {
        let author = entry.author.as_str();
        if !per_author.contains_key(author) {
            order.push(author);
        }
        *per_author.entry(author).or_insert(0.0) += entry.contribution;
    }

    let mut max_share = 0.0;
    let mut top_attester: Option<&str> = None;
    for author in &order {
        let share = per_author[author] / total;
        if share > max_share {
            max_share = share;
            top_attester = Some(author);
        }
    }

    let unique = order.len();
    let spread = (unique as f64 / positives.len() as f64).min(1.0);
    DiversityMetrics {
        diversity: round2(spread * (1.0 - max_share)),
        unique_attesters: unique,
        max_attester_share: max_share,
        top_attester: top_attester.map(str::to_string),
    }
}
