//! tora-testkit
//!
//! Recording in-memory stores for engine and daemon tests.
//!
//! Both fakes are cheap handles over shared state: clone one into the
//! engine, keep the other to inspect calls and seed data. Failures can be
//! injected per operation, optionally keyed by item, and are consumed one
//! per call.

mod blossom;
mod queue;

pub use blossom::{MemoryBlossom, RemoteCall, RemoteOp, ScriptedPage};
pub use queue::{MemoryQueue, QueueCall, QueueOp};

use tora_reconcile::{
    PartnerLookup, PartnerPost, QueueItem, Submission, SyncSettings,
};

/// Settings for tests: no sweep pacing, default service accounts.
pub fn fast_settings() -> SyncSettings {
    SyncSettings {
        sweep_pacing: std::time::Duration::ZERO,
        ..SyncSettings::default()
    }
}

/// A queue item and its tracking-side submission sharing one join key.
///
/// `n` picks distinct ids and URLs:
/// - fullname `t3_q{n}`
/// - permalink `/r/TranscribersOfReddit/comments/q{n}/post/`
/// - partner URL `https://reddit.com/r/origin/comments/p{n}/post/`
pub fn linked_pair(n: i64) -> (QueueItem, Submission) {
    let permalink = format!("/r/TranscribersOfReddit/comments/q{n}/post/");
    let partner = partner_url(n);
    let mut item = QueueItem::new(format!("t3_q{n}"), permalink, partner.clone());
    item.title = format!("Image | post {n}");
    let mut sub = Submission::new(n, item.source_url());
    sub.url = Some(partner);
    sub.original_id = Some(format!("p{n}"));
    (item, sub)
}

pub fn partner_url(n: i64) -> String {
    format!("https://reddit.com/r/origin/comments/p{n}/post/")
}

pub fn partner(url: &str, over_18: bool, removed_by_category: Option<&str>) -> PartnerLookup {
    PartnerLookup::Found(PartnerPost {
        url: url.to_string(),
        over_18,
        removed_by_category: removed_by_category.map(str::to_string),
    })
}

/// Seed `pair` into both stores with a clean partner post.
pub fn seed(blossom: &MemoryBlossom, queue: &MemoryQueue, pair: &(QueueItem, Submission)) {
    let (item, sub) = pair;
    blossom.insert(sub.clone());
    queue.enqueue(item.clone());
    queue.set_partner(&item.url, partner(&item.url, false, None));
}
