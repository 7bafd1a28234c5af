//! In-memory moderation queue.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use tora_reconcile::{
    Lookup, PartnerLookup, QueueItem, RemovalEvent, SourceQueueStore, StoreError,
};

/// One recorded call against [`MemoryQueue`]. Item-level calls carry the
/// item's fullname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueCall {
    RemovalLog(usize),
    ReportQueue,
    ItemByUrl(String),
    Remove(String),
    Approve(String),
    MarkNsfw(String),
    ResolvePartner(String),
    SubmitArchiveLink { title: String, url: String },
}

impl QueueCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            QueueCall::Remove(_)
                | QueueCall::Approve(_)
                | QueueCall::MarkNsfw(_)
                | QueueCall::SubmitArchiveLink { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueueOp {
    RemovalLog,
    ReportQueue,
    ItemByUrl,
    Remove,
    Approve,
    MarkNsfw,
    ResolvePartner,
    SubmitArchiveLink,
}

#[derive(Default)]
struct State {
    /// Keyed by fullname.
    items: BTreeMap<String, QueueItem>,
    /// Fullnames currently in the modqueue, in queue order.
    modqueue: Vec<String>,
    removal_log: Vec<RemovalEvent>,
    /// Keyed by partner URL.
    partners: BTreeMap<String, PartnerLookup>,
    calls: Vec<QueueCall>,
    failures: BTreeMap<(QueueOp, Option<String>), VecDeque<StoreError>>,
}

#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<State>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an item so lookups by URL find it.
    pub fn insert(&self, item: QueueItem) {
        self.state().items.insert(item.fullname.clone(), item);
    }

    /// Store an item and put it in the modqueue.
    pub fn enqueue(&self, item: QueueItem) {
        let mut st = self.state();
        st.modqueue.push(item.fullname.clone());
        st.items.insert(item.fullname.clone(), item);
    }

    pub fn item(&self, fullname: &str) -> Option<QueueItem> {
        self.state().items.get(fullname).cloned()
    }

    pub fn log_removal(&self, event: RemovalEvent) {
        self.state().removal_log.push(event);
    }

    pub fn set_partner(&self, url: &str, partner: PartnerLookup) {
        self.state().partners.insert(url.to_string(), partner);
    }

    pub fn fail_once(&self, op: QueueOp, err: StoreError) {
        self.fail_n(op, None, err, 1);
    }

    /// Fail the next `n` calls of `op` whose key (fullname or URL) is `key`.
    pub fn fail_n(&self, op: QueueOp, key: Option<&str>, err: StoreError, n: usize) {
        let mut st = self.state();
        let q = st.failures.entry((op, key.map(str::to_string))).or_default();
        q.extend(std::iter::repeat(err).take(n));
    }

    pub fn calls(&self) -> Vec<QueueCall> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<QueueCall> {
        self.calls().into_iter().filter(QueueCall::is_write).collect()
    }

    pub fn count(&self, pred: impl Fn(&QueueCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn archive_links(&self) -> Vec<(String, String)> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                QueueCall::SubmitArchiveLink { title, url } => Some((title.clone(), url.clone())),
                _ => None,
            })
            .collect()
    }

    fn enter(&self, call: QueueCall, op: QueueOp, key: Option<String>) -> Result<(), StoreError> {
        let mut st = self.state();
        st.calls.push(call);
        for k in [key, None] {
            if let Some(err) = st.failures.get_mut(&(op, k)).and_then(VecDeque::pop_front) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn update(&self, fullname: &str, f: impl FnOnce(&mut QueueItem)) -> Result<(), StoreError> {
        match self.state().items.get_mut(fullname) {
            Some(item) => {
                f(item);
                Ok(())
            }
            None => Err(StoreError::Api {
                status: 404,
                message: format!("{fullname} not found"),
            }),
        }
    }
}

#[async_trait]
impl SourceQueueStore for MemoryQueue {
    async fn removal_log(&self, limit: usize) -> Result<Vec<RemovalEvent>, StoreError> {
        self.enter(QueueCall::RemovalLog(limit), QueueOp::RemovalLog, None)?;
        Ok(self.state().removal_log.iter().take(limit).cloned().collect())
    }

    async fn report_queue(&self) -> Result<Vec<QueueItem>, StoreError> {
        self.enter(QueueCall::ReportQueue, QueueOp::ReportQueue, None)?;
        let st = self.state();
        Ok(st
            .modqueue
            .iter()
            .filter_map(|name| st.items.get(name).cloned())
            .collect())
    }

    async fn item_by_url(&self, url: &str) -> Result<Lookup<QueueItem>, StoreError> {
        self.enter(
            QueueCall::ItemByUrl(url.to_string()),
            QueueOp::ItemByUrl,
            Some(url.to_string()),
        )?;
        Ok(self
            .state()
            .items
            .values()
            .find(|item| item.source_url() == url)
            .cloned()
            .map_or(Lookup::NotFound, Lookup::Found))
    }

    async fn remove(&self, item: &QueueItem) -> Result<(), StoreError> {
        let name = item.fullname.clone();
        self.enter(QueueCall::Remove(name.clone()), QueueOp::Remove, Some(name.clone()))?;
        self.update(&name, |i| i.removed = true)?;
        self.state().modqueue.retain(|n| *n != name);
        Ok(())
    }

    async fn approve(&self, item: &QueueItem) -> Result<(), StoreError> {
        let name = item.fullname.clone();
        self.enter(QueueCall::Approve(name.clone()), QueueOp::Approve, Some(name.clone()))?;
        self.update(&name, |i| {
            i.approved = true;
            i.ignore_reports = true;
        })?;
        self.state().modqueue.retain(|n| *n != name);
        Ok(())
    }

    async fn mark_nsfw(&self, item: &QueueItem) -> Result<(), StoreError> {
        let name = item.fullname.clone();
        self.enter(QueueCall::MarkNsfw(name.clone()), QueueOp::MarkNsfw, Some(name.clone()))?;
        self.update(&name, |i| i.nsfw = true)
    }

    async fn resolve_partner(&self, item: &QueueItem) -> Result<PartnerLookup, StoreError> {
        self.enter(
            QueueCall::ResolvePartner(item.url.clone()),
            QueueOp::ResolvePartner,
            Some(item.url.clone()),
        )?;
        self.state()
            .partners
            .get(&item.url)
            .cloned()
            .ok_or_else(|| StoreError::Api {
                status: 404,
                message: format!("no partner post at {}", item.url),
            })
    }

    async fn submit_archive_link(&self, title: &str, url: &str) -> Result<(), StoreError> {
        self.enter(
            QueueCall::SubmitArchiveLink {
                title: title.to_string(),
                url: url.to_string(),
            },
            QueueOp::SubmitArchiveLink,
            Some(url.to_string()),
        )
    }
}
