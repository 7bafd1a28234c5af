//! Store boundaries consumed by the engine.
//!
//! Adapters validate remote payloads into the typed model before returning;
//! the engine never sees loosely-typed records. Both traits are object-safe
//! and `Send + Sync` so a daemon can hold them behind `Arc<dyn ...>`.

use async_trait::async_trait;

use crate::{
    Lookup, Page, PartnerLookup, QueueItem, RemovalEvent, StoreError, Submission,
    SubmissionFilter, SubmissionId, Transcription, VolunteerId,
};

/// Tracking-service ("Blossom") submission resource.
#[async_trait]
pub trait RemoteSubmissionStore: Send + Sync {
    /// First submission whose `tor_url` equals `url`.
    async fn find_by_url(&self, url: &str) -> Result<Lookup<Submission>, StoreError>;

    async fn mark_removed(&self, id: SubmissionId) -> Result<(), StoreError>;

    async fn mark_approved(&self, id: SubmissionId) -> Result<(), StoreError>;

    async fn mark_nsfw(&self, id: SubmissionId) -> Result<(), StoreError>;

    async fn file_report(&self, id: SubmissionId, reason: &str) -> Result<(), StoreError>;

    /// One page (1-based) of submissions matching `filter`.
    async fn list_page(
        &self,
        filter: &SubmissionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Submission>, StoreError>;

    async fn mark_archived(&self, id: SubmissionId) -> Result<(), StoreError>;

    /// Submissions whose claim window ran out without a transcription.
    async fn expired_submissions(&self) -> Result<Vec<Submission>, StoreError>;

    /// Completed submissions that were not archived yet.
    async fn unarchived_submissions(&self) -> Result<Vec<Submission>, StoreError>;

    /// First transcription of `id` not written by `exclude_author`.
    async fn human_transcription(
        &self,
        id: SubmissionId,
        exclude_author: Option<VolunteerId>,
    ) -> Result<Lookup<Transcription>, StoreError>;

    async fn volunteer_id(&self, username: &str) -> Result<Lookup<VolunteerId>, StoreError>;
}

/// Moderation-queue ("Reddit") side.
#[async_trait]
pub trait SourceQueueStore: Send + Sync {
    /// Recent removal actions, most recent first, at most `limit` entries.
    async fn removal_log(&self, limit: usize) -> Result<Vec<RemovalEvent>, StoreError>;

    /// Every submission currently sitting in the moderation queue.
    async fn report_queue(&self) -> Result<Vec<QueueItem>, StoreError>;

    /// Fresh lookup of a queue item by its locator.
    async fn item_by_url(&self, url: &str) -> Result<Lookup<QueueItem>, StoreError>;

    async fn remove(&self, item: &QueueItem) -> Result<(), StoreError>;

    /// Approve and suppress further reports on the item.
    async fn approve(&self, item: &QueueItem) -> Result<(), StoreError>;

    async fn mark_nsfw(&self, item: &QueueItem) -> Result<(), StoreError>;

    /// Resolve the partner post `item` points to.
    async fn resolve_partner(&self, item: &QueueItem) -> Result<PartnerLookup, StoreError>;

    /// Post a link into the archive area.
    async fn submit_archive_link(&self, title: &str, url: &str) -> Result<(), StoreError>;
}
