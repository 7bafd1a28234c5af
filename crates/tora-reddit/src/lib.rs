//! tora-reddit
//!
//! [`SourceQueueStore`](tora_reconcile::SourceQueueStore) over the moderation
//! platform's OAuth API: mod log, mod queue, moderation actions, partner-post
//! resolution and archive-link submission.
//!
//! A partner post in a private area answers 403; that is reported as
//! [`PartnerLookup::Forbidden`](tora_reconcile::PartnerLookup::Forbidden),
//! not as an error.

mod client;
pub mod listing;
pub mod ratelimit;

pub use client::{RedditClient, RedditConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
