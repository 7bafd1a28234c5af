//! In-memory tracking service.
//!
//! Every call is recorded; mutating calls also change the stored
//! submission, so a second pass observes the first pass's writes.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tora_reconcile::{
    Lookup, Page, RemoteSubmissionStore, StoreError, Submission, SubmissionFilter, SubmissionId,
    Transcription, VolunteerId,
};

/// One recorded call against [`MemoryBlossom`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
    FindByUrl(String),
    MarkRemoved(SubmissionId),
    MarkApproved(SubmissionId),
    MarkNsfw(SubmissionId),
    FileReport(SubmissionId, String),
    ListPage { page: u32, page_size: u32 },
    MarkArchived(SubmissionId),
    Expired,
    Unarchived,
    HumanTranscription(SubmissionId),
    VolunteerId(String),
}

impl RemoteCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteCall::MarkRemoved(_)
                | RemoteCall::MarkApproved(_)
                | RemoteCall::MarkNsfw(_)
                | RemoteCall::FileReport(..)
                | RemoteCall::MarkArchived(_)
        )
    }
}

/// Operation selector for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RemoteOp {
    FindByUrl,
    MarkRemoved,
    MarkApproved,
    MarkNsfw,
    FileReport,
    ListPage,
    MarkArchived,
    Expired,
    Unarchived,
    HumanTranscription,
    VolunteerId,
}

/// Scripted answer for one `list_page` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedPage {
    pub len: usize,
    pub has_next: bool,
}

impl ScriptedPage {
    pub fn new(len: usize, has_next: bool) -> Self {
        Self { len, has_next }
    }
}

#[derive(Default)]
struct State {
    submissions: BTreeMap<SubmissionId, Submission>,
    transcriptions: BTreeMap<SubmissionId, Vec<Transcription>>,
    volunteers: BTreeMap<String, VolunteerId>,
    expired: Vec<SubmissionId>,
    completed: Vec<SubmissionId>,
    pages: Option<Vec<ScriptedPage>>,
    calls: Vec<RemoteCall>,
    /// Failures consumed one per matching call, keyed by op and optional
    /// call key (URL or id).
    failures: BTreeMap<(RemoteOp, Option<String>), VecDeque<StoreError>>,
}

#[derive(Clone, Default)]
pub struct MemoryBlossom {
    inner: Arc<Mutex<State>>,
}

impl MemoryBlossom {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, submission: Submission) {
        self.state().submissions.insert(submission.id, submission);
    }

    pub fn with(self, submission: Submission) -> Self {
        self.insert(submission);
        self
    }

    pub fn submission(&self, id: SubmissionId) -> Option<Submission> {
        self.state().submissions.get(&id).cloned()
    }

    pub fn add_transcription(&self, submission: SubmissionId, transcription: Transcription) {
        self.state()
            .transcriptions
            .entry(submission)
            .or_default()
            .push(transcription);
    }

    pub fn add_volunteer(&self, username: &str, id: VolunteerId) {
        self.state().volunteers.insert(username.to_string(), id);
    }

    /// Submissions whose claim window ran out.
    pub fn set_expired(&self, ids: Vec<SubmissionId>) {
        self.state().expired = ids;
    }

    /// Completed submissions not archived yet.
    pub fn set_completed(&self, ids: Vec<SubmissionId>) {
        self.state().completed = ids;
    }

    /// Answer `list_page` from a script instead of the stored submissions.
    /// Page `n` (1-based) returns `len` synthetic submissions; requests past
    /// the script return an empty last page.
    pub fn script_pages(&self, pages: Vec<ScriptedPage>) {
        self.state().pages = Some(pages);
    }

    /// Fail the next call of `op` (any key) with `err`.
    pub fn fail_once(&self, op: RemoteOp, err: StoreError) {
        self.fail_n(op, None, err, 1);
    }

    /// Fail the next `n` calls of `op` whose key (URL, id or username) is `key`.
    pub fn fail_n(&self, op: RemoteOp, key: Option<&str>, err: StoreError, n: usize) {
        let mut st = self.state();
        let q = st.failures.entry((op, key.map(str::to_string))).or_default();
        q.extend(std::iter::repeat(err).take(n));
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(RemoteCall::is_write).collect()
    }

    pub fn count(&self, pred: impl Fn(&RemoteCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Record `call`, then fail it if a failure is queued for `op`/`key`.
    fn enter(&self, call: RemoteCall, op: RemoteOp, key: Option<String>) -> Result<(), StoreError> {
        let mut st = self.state();
        st.calls.push(call);
        for k in [key, None] {
            if let Some(err) = st.failures.get_mut(&(op, k)).and_then(VecDeque::pop_front) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn update(&self, id: SubmissionId, f: impl FnOnce(&mut Submission)) -> Result<(), StoreError> {
        match self.state().submissions.get_mut(&id) {
            Some(sub) => {
                f(sub);
                Ok(())
            }
            None => Err(StoreError::Api {
                status: 404,
                message: format!("submission {id} not found"),
            }),
        }
    }

    fn listed(&self, ids: &[SubmissionId]) -> Vec<Submission> {
        let st = self.state();
        ids.iter()
            .filter_map(|id| st.submissions.get(id).cloned())
            .collect()
    }
}

fn matches(filter: &SubmissionFilter, sub: &Submission) -> bool {
    if filter.not_removed && sub.removed_from_queue {
        return false;
    }
    match (filter.created_after, sub.create_time) {
        (Some(cutoff), Some(created)) => created >= cutoff,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

fn synthetic(page: u32, idx: usize, created: Option<DateTime<Utc>>) -> Submission {
    let id = i64::from(page) * 100_000 + idx as i64;
    let mut sub = Submission::new(
        id,
        format!("https://reddit.com/r/TranscribersOfReddit/comments/s{id}/post/"),
    );
    sub.url = Some(format!("https://reddit.com/r/origin/comments/p{id}/post/"));
    sub.create_time = created;
    sub
}

#[async_trait]
impl RemoteSubmissionStore for MemoryBlossom {
    async fn find_by_url(&self, tor_url: &str) -> Result<Lookup<Submission>, StoreError> {
        self.enter(
            RemoteCall::FindByUrl(tor_url.to_string()),
            RemoteOp::FindByUrl,
            Some(tor_url.to_string()),
        )?;
        let st = self.state();
        Ok(st
            .submissions
            .values()
            .find(|s| s.tor_url == tor_url)
            .cloned()
            .map_or(Lookup::NotFound, Lookup::Found))
    }

    async fn mark_removed(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.enter(RemoteCall::MarkRemoved(id), RemoteOp::MarkRemoved, Some(id.to_string()))?;
        self.update(id, |s| s.removed_from_queue = true)
    }

    async fn mark_approved(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.enter(RemoteCall::MarkApproved(id), RemoteOp::MarkApproved, Some(id.to_string()))?;
        self.update(id, |s| s.approved = true)
    }

    async fn mark_nsfw(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.enter(RemoteCall::MarkNsfw(id), RemoteOp::MarkNsfw, Some(id.to_string()))?;
        self.update(id, |s| s.nsfw = true)
    }

    async fn file_report(&self, id: SubmissionId, reason: &str) -> Result<(), StoreError> {
        self.enter(
            RemoteCall::FileReport(id, reason.to_string()),
            RemoteOp::FileReport,
            Some(id.to_string()),
        )?;
        let reason = reason.to_string();
        self.update(id, move |s| s.report_reason = Some(reason))
    }

    async fn list_page(
        &self,
        filter: &SubmissionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Submission>, StoreError> {
        self.enter(
            RemoteCall::ListPage { page, page_size },
            RemoteOp::ListPage,
            Some(page.to_string()),
        )?;
        let st = self.state();

        if let Some(script) = &st.pages {
            let idx = page.saturating_sub(1) as usize;
            let Some(scripted) = script.get(idx) else {
                return Ok(Page::new(Vec::new(), false));
            };
            return Ok(Page::new(
                (0..scripted.len)
                    .map(|i| synthetic(page, i, filter.created_after))
                    .collect(),
                scripted.has_next,
            ));
        }

        let all: Vec<Submission> = st
            .submissions
            .values()
            .filter(|s| matches(filter, s))
            .cloned()
            .collect();
        let size = page_size.max(1) as usize;
        let start = page.saturating_sub(1) as usize * size;
        let items: Vec<Submission> = all.iter().skip(start).take(size).cloned().collect();
        let has_next = start + items.len() < all.len();
        Ok(Page::new(items, has_next))
    }

    async fn mark_archived(&self, id: SubmissionId) -> Result<(), StoreError> {
        self.enter(RemoteCall::MarkArchived(id), RemoteOp::MarkArchived, Some(id.to_string()))?;
        self.update(id, |s| s.archived = true)
    }

    async fn expired_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        self.enter(RemoteCall::Expired, RemoteOp::Expired, None)?;
        let ids = self.state().expired.clone();
        Ok(self.listed(&ids))
    }

    async fn unarchived_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        self.enter(RemoteCall::Unarchived, RemoteOp::Unarchived, None)?;
        let ids = self.state().completed.clone();
        Ok(self
            .listed(&ids)
            .into_iter()
            .filter(|s| !s.archived)
            .collect())
    }

    async fn human_transcription(
        &self,
        id: SubmissionId,
        exclude_author: Option<VolunteerId>,
    ) -> Result<Lookup<Transcription>, StoreError> {
        self.enter(
            RemoteCall::HumanTranscription(id),
            RemoteOp::HumanTranscription,
            Some(id.to_string()),
        )?;
        let st = self.state();
        Ok(st
            .transcriptions
            .get(&id)
            .and_then(|ts| {
                ts.iter()
                    .find(|t| exclude_author.is_none() || t.author_id != exclude_author)
                    .cloned()
            })
            .map_or(Lookup::NotFound, Lookup::Found))
    }

    async fn volunteer_id(&self, username: &str) -> Result<Lookup<VolunteerId>, StoreError> {
        self.enter(
            RemoteCall::VolunteerId(username.to_string()),
            RemoteOp::VolunteerId,
            Some(username.to_string()),
        )?;
        Ok(self
            .state()
            .volunteers
            .get(username)
            .copied()
            .map_or(Lookup::NotFound, Lookup::Found))
    }
}
