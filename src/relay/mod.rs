//! Relay aggregation layer
//!
//! Talks to a configured set of untrusted relays over WebSocket, fans
//! queries and publishes out concurrently under deadlines, and joins the
//! merged data (attestations, revocations, payment receipts) into the
//! scoring kernel's inputs.

pub mod aggregator;
pub mod client;
pub mod protocol;

pub use aggregator::{QueryOptions, RelayAggregator};
pub use client::{PublishOutcome, RelayClient, DEFAULT_RELAY_DEADLINE};
pub use protocol::{Filter, RelayFrame};
