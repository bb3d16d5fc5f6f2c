//! Payment-receipt amount extraction
//!
//! A zap receipt (kind 9735) references an attestation through its `e`
//! tag and embeds the original payment request in a `description` tag.
//! The scorer only needs the summed satoshi total per attestation id, so
//! everything else in the receipt is ignored.

use serde_json::Value;

use crate::event::{Event, KIND_ZAP_RECEIPT};

/// Extract `(attestation_id, sats)` from one zap receipt. Returns `None`
/// when the receipt is malformed in any way: wrong kind, no `e` tag, no
/// parseable request document, or a non-integer amount.
pub fn parse_zap_receipt(event: &Event) -> Option<(String, u64)> {
    if event.kind != KIND_ZAP_RECEIPT {
        return None;
    }
    let attestation_id = event.first_tag_value("e")?.to_string();

    let description = event.first_tag_value("description")?;
    let request: Value = serde_json::from_str(description).ok()?;
    let tags = request.get("tags")?.as_array()?;

    let amount_tag = tags.iter().find_map(|tag| {
        let tag = tag.as_array()?;
        if tag.first()?.as_str()? == "amount" {
            tag.get(1)?.as_str()
        } else {
            None
        }
    })?;

    let millisats: u64 = amount_tag.parse().ok()?;
    if millisats > i64::MAX as u64 {
        return None;
    }
    Some((attestation_id, millisats / 1000))
}
