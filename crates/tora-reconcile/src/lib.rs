//! tora-reconcile
//!
//! Reconciliation engine between the moderation queue ("Reddit side") and the
//! tracking service ("Blossom side").
//!
//! Architectural decisions:
//! - Every pass re-derives its decisions from live reads of both stores
//! - Writes are idempotence-checked immediately before they are issued
//! - Per-item failures are logged and isolated; listing failures and rate
//!   limits surface to the scheduler
//! - Auto-resolution is planned by a pure function (`plan`) and executed by
//!   the engine
//!
//! Store adapters live in `tora-blossom` and `tora-reddit`; this crate only
//! defines the seams they implement.

mod archive;
mod engine;
mod error;
mod plan;
mod store;
mod types;

pub use archive::{archive_completed, process_expired, transcription_link};
pub use engine::{ReconcileEngine, SyncSettings};
pub use error::{StoreError, SyncError};
pub use plan::{plan_auto_resolution, HandledBy, ResolutionPlan, SyncAction};
pub use store::{RemoteSubmissionStore, SourceQueueStore};
pub use types::*;
