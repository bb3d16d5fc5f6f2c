//! Relay wire protocol
//!
//! Frames are JSON arrays: `["REQ", sub, filter]`, `["EVENT", event]` and
//! `["CLOSE", sub]` outbound; `["EVENT", sub, event]`, `["OK", id, bool,
//! reason]`, `["EOSE", sub]` and `["NOTICE", msg]` inbound. Anything the
//! parser does not recognise is ignored rather than treated as a protocol
//! violation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::event::Event;

/// Subscription filter. Field names mirror the wire shape; tag filters
/// use the `#x` key form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(rename = "#L", skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
    #[serde(rename = "#l", skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(rename = "#p", skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
    #[serde(rename = "#e", skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Encode a subscription request.
pub fn encode_req(sub_id: &str, filter: &Filter) -> Result<String> {
    let frame = json!(["REQ", sub_id, filter]);
    serde_json::to_string(&frame).context("Failed to encode REQ frame")
}

/// Encode an event publish.
pub fn encode_event(event: &Event) -> Result<String> {
    let frame = json!(["EVENT", event]);
    serde_json::to_string(&frame).context("Failed to encode EVENT frame")
}

/// Encode a subscription close.
pub fn encode_close(sub_id: &str) -> String {
    json!(["CLOSE", sub_id]).to_string()
}

/// Inbound frames the client reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Event { sub_id: String, event: Event },
    Ok { event_id: String, accepted: bool, reason: String },
    EndOfStored { sub_id: String },
    Notice { message: String },
}

/// Parse an inbound frame. Returns `None` for anything malformed or
/// unknown; the connection stays up either way.
pub fn parse_frame(text: &str) -> Option<RelayFrame> {
    let value: Value = serde_json::from_str(text).ok()?;
    let array = value.as_array()?;
    let frame_type = array.first()?.as_str()?;

    match frame_type {
        "EVENT" => {
            let sub_id = array.get(1)?.as_str()?.to_string();
            let event: Event = serde_json::from_value(array.get(2)?.clone()).ok()?;
            Some(RelayFrame::Event { sub_id, event })
        }
        "OK" => {
            let event_id = array.get(1)?.as_str()?.to_string();
            let accepted = array.get(2)?.as_bool()?;
            let reason = array
                .get(3)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(RelayFrame::Ok {
                event_id,
                accepted,
                reason,
            })
        }
        "EOSE" => Some(RelayFrame::EndOfStored {
            sub_id: array.get(1)?.as_str()?.to_string(),
        }),
        "NOTICE" => Some(RelayFrame::Notice {
            message: array.get(1)?.as_str()?.to_string(),
        }),
        _ => None,
    }
}
