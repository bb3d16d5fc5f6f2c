//! Category projection over the scoring kernel
//!
//! Filters the attestation bag to a named slice of activity before
//! scoring, so callers can ask "how trusted is this key for commerce"
//! separately from its overall standing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::{parse_attestation, Attestation, AttestationType, Event};

use super::kernel::{compute_score, AttesterResolver, ScoreOptions, ScoreResult};

/// Named categories plus single-type projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    /// service-quality and work-completed
    Commerce,
    /// identity-continuity
    Identity,
    /// service-quality with "code" in the content
    Code,
    /// everything
    General,
    /// a single attestation type by its bare name
    Single(AttestationType),
}

/// The four named categories, in reporting order.
pub const NAMED_CATEGORIES: [ScoreCategory; 4] = [
    ScoreCategory::Commerce,
    ScoreCategory::Identity,
    ScoreCategory::Code,
    ScoreCategory::General,
];

impl ScoreCategory {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "commerce" => Some(Self::Commerce),
            "identity" => Some(Self::Identity),
            "code" => Some(Self::Code),
            "general" => Some(Self::General),
            other => AttestationType::parse(other).map(Self::Single),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Commerce => "commerce",
            Self::Identity => "identity",
            Self::Code => "code",
            Self::General => "general",
            Self::Single(kind) => kind.as_str(),
        }
    }

    fn matches(&self, att: &Attestation) -> bool {
        match self {
            Self::Commerce => matches!(
                att.kind,
                AttestationType::ServiceQuality | AttestationType::WorkCompleted
            ),
            Self::Identity => att.kind == AttestationType::IdentityContinuity,
            Self::Code => {
                att.kind == AttestationType::ServiceQuality
                    && att.content.to_lowercase().contains("code")
            }
            Self::General => true,
            Self::Single(kind) => att.kind == *kind,
        }
    }
}

/// Score the slice of the bag matching one category.
pub fn category_score(
    events: &[Event],
    zap_totals: &HashMap<String, u64>,
    category: &ScoreCategory,
    options: &ScoreOptions,
    resolver: &dyn AttesterResolver,
) -> ScoreResult {
    let filtered: Vec<Event> = events
        .iter()
        .filter(|event| {
            parse_attestation(event)
                .map(|att| category.matches(&att))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    compute_score(&filtered, zap_totals, options, resolver)
}

/// Score every named category over the same bag.
pub fn all_category_scores(
    events: &[Event],
    zap_totals: &HashMap<String, u64>,
    options: &ScoreOptions,
    resolver: &dyn AttesterResolver,
) -> HashMap<String, ScoreResult> {
    NAMED_CATEGORIES
        .iter()
        .map(|category| {
            (
                category.name().to_string(),
                category_score(events, zap_totals, category, options, resolver),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{attestation_tags, KIND_ATTESTATION};
    use crate::scoring::kernel::NoAttesterInfo;

    const T0: i64 = 1_700_000_000;

    fn key(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn attestation_event(
        id: char,
        author: &str,
        kind: AttestationType,
        content: &str,
    ) -> Event {
        Event {
            id: id.to_string().repeat(64),
            pubkey: author.to_string(),
            created_at: T0,
            kind: KIND_ATTESTATION,
            tags: attestation_tags(kind, &key('f'), None),
            content: content.to_string(),
            sig: String::new(),
        }
    }

    fn opts() -> ScoreOptions {
        ScoreOptions {
            now: Some(T0),
            ..ScoreOptions::default()
        }
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(ScoreCategory::parse("commerce"), Some(ScoreCategory::Commerce));
        assert_eq!(
            ScoreCategory::parse("work-completed"),
            Some(ScoreCategory::Single(AttestationType::WorkCompleted))
        );
        assert_eq!(ScoreCategory::parse("nope"), None);
    }

    #[test]
    fn test_commerce_excludes_identity() {
        let events = vec![
            attestation_event('1', &key('a'), AttestationType::ServiceQuality, "fast"),
            attestation_event('2', &key('b'), AttestationType::IdentityContinuity, "same key"),
        ];
        let result = category_score(
            &events,
            &HashMap::new(),
            &ScoreCategory::Commerce,
            &opts(),
            &NoAttesterInfo,
        );
        assert_eq!(result.attestation_count, 1);
        assert_eq!(result.breakdown[0].event_id, "1".repeat(64));
    }

    #[test]
    fn test_code_requires_content_substring() {
        let events = vec![
            attestation_event('1', &key('a'), AttestationType::ServiceQuality, "great CODE review"),
            attestation_event('2', &key('b'), AttestationType::ServiceQuality, "fast delivery"),
        ];
        let result = category_score(
            &events,
            &HashMap::new(),
            &ScoreCategory::Code,
            &opts(),
            &NoAttesterInfo,
        );
        assert_eq!(result.attestation_count, 1);
        assert_eq!(result.breakdown[0].event_id, "1".repeat(64));
    }

    #[test]
    fn test_all_categories_cover_named_set() {
        let events = vec![attestation_event(
            '1',
            &key('a'),
            AttestationType::ServiceQuality,
            "ok",
        )];
        let scores = all_category_scores(&events, &HashMap::new(), &opts(), &NoAttesterInfo);
        assert_eq!(scores.len(), 4);
        assert!(scores["commerce"].raw > 0.0);
        assert!(scores["general"].raw > 0.0);
        assert_eq!(scores["identity"].raw, 0.0);
        assert_eq!(scores["code"].raw, 0.0);
    }
}
