//! Typed attestation view over raw events
//!
//! Parsing happens once, at the edge. The scoring kernel and everything
//! behind it only ever sees [`Attestation`] records that already carry a
//! recognised type and a valid target key.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{validate_key, Event, KIND_ATTESTATION};

/// Protocol namespace carried in the `L` marker tag and the strict `l` tag.
pub const NAMESPACE: &str = "ai.wot";

/// Closed set of attestation verdicts with their fixed score multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttestationType {
    ServiceQuality,
    WorkCompleted,
    IdentityContinuity,
    GeneralTrust,
    Warning,
    Dispute,
}

impl AttestationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceQuality => "service-quality",
            Self::WorkCompleted => "work-completed",
            Self::IdentityContinuity => "identity-continuity",
            Self::GeneralTrust => "general-trust",
            Self::Warning => "warning",
            Self::Dispute => "dispute",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "service-quality" => Some(Self::ServiceQuality),
            "work-completed" => Some(Self::WorkCompleted),
            "identity-continuity" => Some(Self::IdentityContinuity),
            "general-trust" => Some(Self::GeneralTrust),
            "warning" => Some(Self::Warning),
            "dispute" => Some(Self::Dispute),
            _ => None,
        }
    }

    /// Base score multiplier. Positive and negative sets are disjoint.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::ServiceQuality => 1.5,
            Self::WorkCompleted => 1.2,
            Self::IdentityContinuity => 1.0,
            Self::GeneralTrust => 0.8,
            Self::Warning => -0.8,
            Self::Dispute => -1.5,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.multiplier() < 0.0
    }

    pub fn is_positive(&self) -> bool {
        self.multiplier() > 0.0
    }
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a raw event did not yield a typed attestation.
///
/// These are protocol-parse outcomes, not errors: the scorer records them
/// in the breakdown and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseIssue {
    WrongKind(u32),
    MissingTypeTag,
    UnknownType(String),
    MissingTarget,
    InvalidTarget(String),
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongKind(kind) => write!(f, "wrong event kind {kind}"),
            Self::MissingTypeTag => write!(f, "no recognised type tag"),
            Self::UnknownType(value) => write!(f, "unknown attestation type {value:?}"),
            Self::MissingTarget => write!(f, "no target key tag"),
            Self::InvalidTarget(value) => write!(f, "invalid target key {value:?}"),
        }
    }
}

/// A parsed attestation: one author's typed verdict about one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub event_id: String,
    pub author: String,
    pub target: String,
    pub kind: AttestationType,
    pub content: String,
    pub created_at: i64,
    /// Optional reference tying this attestation to a prior event.
    pub event_ref: Option<String>,
}

/// Parse a raw event into a typed attestation.
///
/// The type tag is parsed strictly as `["l", TYPE, "ai.wot"]`. When that
/// form is absent but the `["L", "ai.wot"]` namespace marker is present,
/// the lenient two-element form `["l", TYPE]` is accepted for any
/// recognised TYPE.
pub fn parse_attestation(event: &Event) -> Result<Attestation, ParseIssue> {
    if event.kind != KIND_ATTESTATION {
        return Err(ParseIssue::WrongKind(event.kind));
    }

    let kind = parse_type_tag(event)?;

    let target = event
        .first_tag_value("p")
        .ok_or(ParseIssue::MissingTarget)?
        .to_string();
    validate_key(&target).map_err(|_| ParseIssue::InvalidTarget(target.clone()))?;

    Ok(Attestation {
        event_id: event.id.clone(),
        author: event.pubkey.clone(),
        target,
        kind,
        content: event.content.clone(),
        created_at: event.created_at,
        event_ref: event.first_tag_value("e").map(str::to_string),
    })
}

fn parse_type_tag(event: &Event) -> Result<AttestationType, ParseIssue> {
    // Strict form first: namespace in the third position.
    let strict = event
        .tags
        .iter()
        .find(|t| t.len() >= 3 && t[0] == "l" && t[2] == NAMESPACE);
    if let Some(tag) = strict {
        return AttestationType::parse(&tag[1]).ok_or_else(|| ParseIssue::UnknownType(tag[1].clone()));
    }

    // Lenient form only under the namespace marker.
    if event.has_tag("L", NAMESPACE) {
        if let Some(value) = event.first_tag_value("l") {
            return AttestationType::parse(value)
                .ok_or_else(|| ParseIssue::UnknownType(value.to_string()));
        }
    }

    Err(ParseIssue::MissingTypeTag)
}

/// Canonical tag set for a new attestation event.
pub fn attestation_tags(
    kind: AttestationType,
    target: &str,
    event_ref: Option<&str>,
) -> Vec<Vec<String>> {
    let mut tags = vec![
        vec!["L".to_string(), NAMESPACE.to_string()],
        vec![
            "l".to_string(),
            kind.as_str().to_string(),
            NAMESPACE.to_string(),
        ],
        vec!["p".to_string(), target.to_string()],
    ];
    if let Some(event_ref) = event_ref {
        tags.push(vec!["e".to_string(), event_ref.to_string()]);
    }
    tags
}
