use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix joined onto queue permalinks to form the tracking-service join key.
pub const REDDIT_BASE_URL: &str = "https://reddit.com";

/// Report reason users pick when a post is missing its NSFW flag.
pub const NSFW_REPORT_REASON: &str = "Post should be marked as NSFW";

/// Identifier assigned by the tracking service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub i64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a volunteer account on the tracking service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolunteerId(pub i64);

impl fmt::Display for VolunteerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build the join key for a queue permalink (`/r/.../comments/...`).
pub fn source_url_for(permalink: &str) -> String {
    if permalink.starts_with("http://") || permalink.starts_with("https://") {
        permalink.to_string()
    } else {
        format!("{REDDIT_BASE_URL}{permalink}")
    }
}

// ---------------------------------------------------------------------------
// Tracking-service side
// ---------------------------------------------------------------------------

/// Tracking-service record of a transcription submission.
///
/// Mirrored, not owned: the engine only ever patches sub-states on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    /// Locator of the queue item; the join key between the two stores.
    pub tor_url: String,
    /// Locator of the partner post.
    pub url: Option<String>,
    pub original_id: Option<String>,
    pub title: Option<String>,
    pub removed_from_queue: bool,
    pub approved: bool,
    pub report_reason: Option<String>,
    pub nsfw: bool,
    pub archived: bool,
    pub create_time: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn new(id: i64, tor_url: impl Into<String>) -> Self {
        Self {
            id: SubmissionId(id),
            tor_url: tor_url.into(),
            url: None,
            original_id: None,
            title: None,
            removed_from_queue: false,
            approved: false,
            report_reason: None,
            nsfw: false,
            archived: false,
            create_time: None,
        }
    }

    /// `true` when the tracking side already reflects a resolution of the
    /// current report (removed, approved, or reported).
    pub fn report_handled(&self) -> bool {
        self.removed_from_queue
            || self.approved
            || self
                .report_reason
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty())
    }
}

/// Filter for paginated submission listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionFilter {
    /// Only submissions nobody has claimed yet.
    pub unclaimed: bool,
    /// Only submissions that are still in the queue.
    pub not_removed: bool,
    /// Only submissions created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
}

impl SubmissionFilter {
    /// The full-sweep filter: unclaimed, not removed, created after `cutoff`.
    pub fn sweep(cutoff: DateTime<Utc>) -> Self {
        Self {
            unclaimed: true,
            not_removed: true,
            created_after: Some(cutoff),
        }
    }
}

/// One page of a paginated listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Records the store returned, including any the adapter dropped as
    /// malformed. Pagination compares this, not `items.len()`, to the page size.
    pub fetched: usize,
    /// The store advertised another page after this one.
    pub has_next: bool,
}

impl<T> Page<T> {
    /// A page where every returned record decoded.
    pub fn new(items: Vec<T>, has_next: bool) -> Self {
        Self {
            fetched: items.len(),
            items,
            has_next,
        }
    }
}

/// A transcription attached to a submission (archival only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    pub id: i64,
    pub author_id: Option<VolunteerId>,
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Moderation-queue side
// ---------------------------------------------------------------------------

/// A single report entry: `(reason, reporter)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub reason: String,
    pub reporter: String,
}

impl Report {
    pub fn new(reason: impl Into<String>, reporter: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            reporter: reporter.into(),
        }
    }
}

/// A post living in the moderation queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Fullname (`t3_<id>`) used by moderation actions.
    pub fullname: String,
    pub permalink: String,
    /// Locator of the partner post this item tracks.
    pub url: String,
    pub title: String,
    pub removed: bool,
    pub ignore_reports: bool,
    pub approved: bool,
    pub nsfw: bool,
    pub mod_reports: Vec<Report>,
    pub user_reports: Vec<Report>,
    pub removed_by_category: Option<String>,
}

impl QueueItem {
    pub fn new(
        fullname: impl Into<String>,
        permalink: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            fullname: fullname.into(),
            permalink: permalink.into(),
            url: url.into(),
            title: String::new(),
            removed: false,
            ignore_reports: false,
            approved: false,
            nsfw: false,
            mod_reports: Vec::new(),
            user_reports: Vec::new(),
            removed_by_category: None,
        }
    }

    /// Join key against [`Submission::tor_url`].
    pub fn source_url(&self) -> String {
        source_url_for(&self.permalink)
    }

    /// The "active" report reason: first moderator report, else first user report.
    pub fn active_report_reason(&self) -> Option<&str> {
        self.mod_reports
            .first()
            .or_else(|| self.user_reports.first())
            .map(|r| r.reason.as_str())
    }

    /// Removed by a moderator, or deleted or removed upstream
    /// (`removed_by_category` set).
    pub fn is_removed(&self) -> bool {
        self.removed || self.removed_by_category.is_some()
    }

    /// `true` when a moderator already handled this item on the queue side.
    pub fn is_resolved(&self) -> bool {
        self.is_removed() || self.ignore_reports || self.approved
    }
}

/// The original post a queue item references. Read-only ground truth for
/// NSFW and removal propagation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerPost {
    pub url: String,
    pub over_18: bool,
    pub removed_by_category: Option<String>,
}

impl PartnerPost {
    pub fn is_removed(&self) -> bool {
        self.removed_by_category.is_some()
    }
}

/// Outcome of resolving a partner post.
///
/// `Forbidden` is a definitive answer (the source area went private), not a
/// transport failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartnerLookup {
    Found(PartnerPost),
    Forbidden,
}

/// A moderation-log entry for a removal action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalEvent {
    pub moderator: String,
    pub target_permalink: String,
    pub created_utc: DateTime<Utc>,
}

impl RemovalEvent {
    pub fn source_url(&self) -> String {
        source_url_for(&self.target_permalink)
    }
}

/// Result of a keyed lookup that reached the store.
///
/// A failed call is reported as `Err(StoreError)`, never as `NotFound`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

// ---------------------------------------------------------------------------
// Pass summaries
// ---------------------------------------------------------------------------

/// Which engine procedure produced a [`PassSummary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Removals,
    Reports,
    FullSweep,
    ExpiredArchival,
    CompletedArchival,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Removals => "removals",
            PassKind::Reports => "reports",
            PassKind::FullSweep => "full_sweep",
            PassKind::ExpiredArchival => "expired_archival",
            PassKind::CompletedArchival => "completed_archival",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters describing what a single pass did. Purely informational.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass: PassKind,
    pub examined: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub lookup_failed: usize,
    pub writes_ok: usize,
    pub writes_failed: usize,
    pub auto_handled: usize,
    pub reported: usize,
    pub pages_fetched: usize,
    /// The pass stopped early because a shutdown was requested.
    pub interrupted: bool,
}

impl PassSummary {
    pub fn new(pass: PassKind) -> Self {
        Self {
            pass,
            examined: 0,
            skipped: 0,
            not_found: 0,
            lookup_failed: 0,
            writes_ok: 0,
            writes_failed: 0,
            auto_handled: 0,
            reported: 0,
            pages_fetched: 0,
            interrupted: false,
        }
    }

    pub(crate) fn record_write(&mut self, ok: bool) {
        if ok {
            self.writes_ok += 1;
        } else {
            self.writes_failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_url_prefixes_relative_permalinks() {
        assert_eq!(
            source_url_for("/r/TranscribersOfReddit/comments/abc/x/"),
            "https://reddit.com/r/TranscribersOfReddit/comments/abc/x/"
        );
        assert_eq!(
            source_url_for("https://reddit.com/r/a/comments/b/"),
            "https://reddit.com/r/a/comments/b/"
        );
    }

    #[test]
    fn mod_report_wins_over_user_report() {
        let mut item = QueueItem::new("t3_a", "/r/x/comments/a/", "https://reddit.com/r/y/comments/z/");
        item.user_reports.push(Report::new("spam", "1"));
        item.mod_reports.push(Report::new("Rule 3", "some_mod"));
        assert_eq!(item.active_report_reason(), Some("Rule 3"));
    }

    #[test]
    fn user_report_used_without_mod_report() {
        let mut item = QueueItem::new("t3_a", "/r/x/comments/a/", "u");
        item.user_reports.push(Report::new("spam", "1"));
        item.user_reports.push(Report::new("other", "1"));
        assert_eq!(item.active_report_reason(), Some("spam"));
    }

    #[test]
    fn no_reports_means_no_reason() {
        let item = QueueItem::new("t3_a", "/r/x/comments/a/", "u");
        assert_eq!(item.active_report_reason(), None);
    }

    #[test]
    fn upstream_removal_marks_item_removed_and_resolved() {
        let mut item = QueueItem::new("t3_a", "/r/x/comments/a/", "u");
        assert!(!item.is_removed());
        item.removed_by_category = Some("deleted".to_string());
        assert!(item.is_removed());
        assert!(item.is_resolved());
    }

    #[test]
    fn blank_report_reason_does_not_count_as_handled() {
        let mut sub = Submission::new(1, "https://reddit.com/r/x/comments/a/");
        sub.report_reason = Some("  ".to_string());
        assert!(!sub.report_handled());
        sub.report_reason = Some("spam".to_string());
        assert!(sub.report_handled());
    }
}
