//! tora-blossom
//!
//! [`RemoteSubmissionStore`](tora_reconcile::RemoteSubmissionStore) over the
//! tracking service's REST API.
//!
//! Payloads are decoded into wire structs and normalized into the typed model
//! here; nothing past this crate sees raw JSON. Malformed entries in a list
//! are dropped with a warning, a malformed single lookup is a `Decode` error.

mod client;
pub mod wire;

pub use client::{BlossomClient, BlossomConfig, DEFAULT_BASE_URL};
