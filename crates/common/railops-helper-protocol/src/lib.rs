//! Wire contract shared with the separately-deployed desktop helper.
//!
//! The helper cannot be upgraded in lockstep with the cloud service, so every
//! response struct in this crate is append-only: documented fields never
//! move, rename, or change type. New fields must be `Option` with
//! `#[serde(default)]`, and deserialization tolerates unknown fields on both
//! sides. `tests/contract.rs` pins the frozen shapes.

pub mod barcode;
pub mod types;

pub use barcode::{BarcodePayload, BarcodePayloadError};
pub use types::*;
