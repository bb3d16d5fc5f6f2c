//! Receipt construction
//!
//! Turns economic transaction records into trust claims: service results
//! become canonical attestation bodies, payment receipts become
//! per-attestation satoshi totals for zap weighting.

pub mod service;
pub mod zap;

pub use service::{
    build_receipt_body, parse_service_result, ReceiptBody, ReceiptOptions, ServiceResult,
};
pub use zap::parse_zap_receipt;
