//! Service-result parsing and receipt body construction
//!
//! Service results are signed records in the kind range [6000, 6999],
//! published by a provider after completing a request of kind
//! (result kind - 1000). The receipt constructor turns one into a
//! canonical attestation body tying the trust claim to the result event.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::event::{
    attestation_tags, AttestationType, Event, SERVICE_REQUEST_KIND_OFFSET,
    SERVICE_RESULT_KIND_MAX, SERVICE_RESULT_KIND_MIN,
};

/// Structured view of a service-result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult {
    pub result_event_id: String,
    pub request_kind: u32,
    pub request_event_id: Option<String>,
    pub provider_key: String,
    pub requester_key: Option<String>,
    pub amount_sats: Option<u64>,
}

/// Parse a service-result event. Returns `None` for kinds outside the
/// service-result range or records missing their identity fields.
pub fn parse_service_result(event: &Event) -> Option<ServiceResult> {
    if !(SERVICE_RESULT_KIND_MIN..=SERVICE_RESULT_KIND_MAX).contains(&event.kind) {
        return None;
    }
    if event.id.is_empty() || event.pubkey.is_empty() {
        return None;
    }

    let amount_sats = event
        .first_tag_value("amount")
        .and_then(parse_millisats)
        .map(|millisats| millisats / 1000);

    Some(ServiceResult {
        result_event_id: event.id.clone(),
        request_kind: event.kind - SERVICE_REQUEST_KIND_OFFSET,
        request_event_id: event.first_tag_value("e").map(str::to_string),
        provider_key: event.pubkey.clone(),
        requester_key: event.first_tag_value("p").map(str::to_string),
        amount_sats,
    })
}

/// Typed millisat conversion: non-negative 63-bit integer or nothing.
fn parse_millisats(value: &str) -> Option<u64> {
    let millisats: u64 = value.parse().ok()?;
    if millisats > i64::MAX as u64 {
        return None;
    }
    Some(millisats)
}

/// Options for building a receipt attestation.
#[derive(Debug, Clone, Default)]
pub struct ReceiptOptions {
    /// Attestation type override; defaults to service-quality.
    pub attestation_type: Option<AttestationType>,
    /// Star rating, clamped into [1, 5].
    pub rating: Option<u8>,
    /// Free-text trailer for the comment.
    pub notes: Option<String>,
}

/// Canonical attestation body produced from a service result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptBody {
    pub attestation_type: AttestationType,
    pub target: String,
    pub comment: String,
    pub event_ref: String,
    pub tags: Vec<Vec<String>>,
}

/// Build the attestation body for a service result.
///
/// The comment is a pipe-separated structured string, e.g.
/// `DVM receipt | kind:5050 (text-generation) | 21 sats | rating:5/5 | fast`,
/// with segments omitted when their source is absent.
pub fn build_receipt_body(result: &ServiceResult, options: &ReceiptOptions) -> Result<ReceiptBody> {
    if result.provider_key.is_empty() {
        return Err(anyhow::anyhow!("Service result has no provider key"));
    }
    if result.result_event_id.is_empty() {
        return Err(anyhow::anyhow!("Service result has no result event id"));
    }

    let attestation_type = options
        .attestation_type
        .unwrap_or(AttestationType::ServiceQuality);

    let mut segments = vec!["DVM receipt".to_string()];
    segments.push(match request_kind_name(result.request_kind) {
        Some(name) => format!("kind:{} ({})", result.request_kind, name),
        None => format!("kind:{}", result.request_kind),
    });
    if let Some(sats) = result.amount_sats {
        segments.push(format!("{sats} sats"));
    }
    if let Some(rating) = options.rating {
        segments.push(format!("rating:{}/5", rating.clamp(1, 5)));
    }
    if let Some(notes) = options.notes.as_deref() {
        if !notes.trim().is_empty() {
            segments.push(notes.trim().to_string());
        }
    }

    Ok(ReceiptBody {
        attestation_type,
        target: result.provider_key.clone(),
        comment: segments.join(" | "),
        event_ref: result.result_event_id.clone(),
        tags: attestation_tags(
            attestation_type,
            &result.provider_key,
            Some(&result.result_event_id),
        ),
    })
}

/// Well-known request kind names, for the comment annotation.
fn request_kind_name(kind: u32) -> Option<&'static str> {
    match kind {
        5000 => Some("text-extraction"),
        5001 => Some("summarization"),
        5002 => Some("translation"),
        5050 => Some("text-generation"),
        5100 => Some("image-generation"),
        5250 => Some("text-to-speech"),
        5300 => Some("content-discovery"),
        5302 => Some("search"),
        _ => None,
    }
}
