//! Per-relay WebSocket operations
//!
//! Each operation opens a fresh connection, runs one subscription or one
//! publish, and closes. Every read is bounded by the per-relay deadline;
//! a relay that stalls past it simply loses its slot in the aggregate.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::event::Event;

use super::protocol::{encode_close, encode_event, encode_req, parse_frame, Filter, RelayFrame};

/// Default per-relay deadline for a full subscription or publish round.
pub const DEFAULT_RELAY_DEADLINE: Duration = Duration::from_secs(12);

/// Outcome of publishing one event to one relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub relay: String,
    pub accepted: bool,
    pub reason: Option<String>,
}

/// Client for a single relay URL.
#[derive(Debug, Clone)]
pub struct RelayClient {
    url: String,
    deadline: Duration,
}

impl RelayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            deadline: DEFAULT_RELAY_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run one filter subscription to completion: accumulate events until
    /// the end-of-stored-events marker or the deadline, whichever first.
    /// Partial results gathered before the deadline are returned.
    pub async fn fetch_events(&self, filter: &Filter) -> Result<Vec<Event>> {
        let deadline = Instant::now() + self.deadline;
        let (mut socket, _) = timeout(self.deadline, connect_async(self.url.as_str()))
            .await
            .with_context(|| format!("Timed out connecting to {}", self.url))?
            .with_context(|| format!("Failed to connect to {}", self.url))?;

        let sub_id = subscription_id();
        let req = encode_req(&sub_id, filter)?;
        socket
            .send(Message::Text(req))
            .await
            .with_context(|| format!("Failed to send subscription to {}", self.url))?;

        let mut events = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(relay = %self.url, "Subscription deadline reached, keeping partial data");
                break;
            }
            let message = match timeout(remaining, socket.next()).await {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    debug!(relay = %self.url, error = %e, "Socket error mid-subscription");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(relay = %self.url, "Subscription deadline reached, keeping partial data");
                    break;
                }
            };

            match message {
                Message::Text(text) => match parse_frame(&text) {
                    Some(RelayFrame::Event { sub_id: sid, event }) if sid == sub_id => {
                        events.push(event);
                    }
                    Some(RelayFrame::EndOfStored { sub_id: sid }) if sid == sub_id => break,
                    Some(RelayFrame::Notice { message }) => {
                        debug!(relay = %self.url, %message, "Relay notice");
                    }
                    // Frames for other subscriptions or unknown shapes are
                    // ignored, never a reason to drop the connection.
                    _ => {}
                },
                Message::Ping(payload) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        // Best-effort close; the subscription is already complete.
        let _ = socket.send(Message::Text(encode_close(&sub_id))).await;
        let _ = socket.close(None).await;

        Ok(events)
    }

    /// Publish one event and wait for the relay's accepted/rejected reply.
    pub async fn publish(&self, event: &Event) -> Result<PublishOutcome> {
        let deadline = Instant::now() + self.deadline;
        let (mut socket, _) = timeout(self.deadline, connect_async(self.url.as_str()))
            .await
            .with_context(|| format!("Timed out connecting to {}", self.url))?
            .with_context(|| format!("Failed to connect to {}", self.url))?;

        socket
            .send(Message::Text(encode_event(event)?))
            .await
            .with_context(|| format!("Failed to send event to {}", self.url))?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(anyhow::anyhow!(
                    "Timed out waiting for acknowledgement from {}",
                    self.url
                ));
            }
            let message = match timeout(remaining, socket.next()).await {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    return Err(anyhow::anyhow!("Socket error from {}: {}", self.url, e));
                }
                Ok(None) => {
                    return Err(anyhow::anyhow!(
                        "Connection to {} closed before acknowledgement",
                        self.url
                    ));
                }
                Err(_) => {
                    return Err(anyhow::anyhow!(
                        "Timed out waiting for acknowledgement from {}",
                        self.url
                    ));
                }
            };

            match message {
                Message::Text(text) => {
                    if let Some(RelayFrame::Ok {
                        event_id,
                        accepted,
                        reason,
                    }) = parse_frame(&text)
                    {
                        if event_id == event.id {
                            let _ = socket.close(None).await;
                            return Ok(PublishOutcome {
                                relay: self.url.clone(),
                                accepted,
                                reason: if reason.is_empty() { None } else { Some(reason) },
                            });
                        }
                    }
                }
                Message::Ping(payload) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Message::Close(_) => {
                    return Err(anyhow::anyhow!(
                        "Connection to {} closed before acknowledgement",
                        self.url
                    ));
                }
                _ => {}
            }
        }
    }
}

fn subscription_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
