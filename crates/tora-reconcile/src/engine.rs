use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::plan::{plan_auto_resolution, ResolutionPlan, SyncAction};
use crate::{
    Lookup, PartnerLookup, PassKind, PassSummary, QueueItem, RemoteSubmissionStore,
    SourceQueueStore, StoreError, Submission, SubmissionFilter, SyncError,
};

/// Tunables for the engine passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    /// Our own bot accounts; removals they performed are never mirrored back.
    pub service_accounts: Vec<String>,
    /// How many moderation-log entries a removal pass looks at.
    pub removal_log_limit: usize,
    /// Trailing creation window covered by a full sweep.
    pub sweep_window: chrono::Duration,
    pub sweep_page_size: u32,
    /// Delay between submissions in a full sweep (queue-side rate limits).
    pub sweep_pacing: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            service_accounts: vec!["tor_archivist".to_string(), "blossom".to_string()],
            removal_log_limit: 100,
            sweep_window: chrono::Duration::hours(18),
            sweep_page_size: 500,
            sweep_pacing: Duration::from_secs(1),
        }
    }
}

/// Reconciles the moderation queue and the tracking service.
///
/// Holds no state between passes apart from the two stores and a stop flag;
/// every decision is re-derived from live reads.
pub struct ReconcileEngine<R, Q> {
    remote: R,
    queue: Q,
    settings: SyncSettings,
    stop: Arc<AtomicBool>,
}

impl<R, Q> ReconcileEngine<R, Q>
where
    R: RemoteSubmissionStore,
    Q: SourceQueueStore,
{
    pub fn new(remote: R, queue: Q, settings: SyncSettings) -> Self {
        Self {
            remote,
            queue,
            settings,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Flag checked between items. Setting it makes the running pass return
    /// after the current item with `interrupted = true`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Case-insensitive match against the configured service accounts.
    pub fn is_service_account(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.settings
            .service_accounts
            .iter()
            .any(|acct| acct.trim().to_lowercase() == name)
    }

    // -----------------------------------------------------------------------
    // Removal tracking
    // -----------------------------------------------------------------------

    /// Mirror moderator removals from the moderation log to the tracking service.
    pub async fn track_removals(&self) -> Result<PassSummary, SyncError> {
        let pass = PassKind::Removals;
        let mut summary = PassSummary::new(pass);

        let events = self
            .queue
            .removal_log(self.settings.removal_log_limit)
            .await
            .map_err(|source| SyncError::Enumeration { pass, source })?;

        for event in events {
            if self.should_stop() {
                summary.interrupted = true;
                break;
            }
            summary.examined += 1;

            if self.is_service_account(&event.moderator) {
                summary.skipped += 1;
                continue;
            }

            let tor_url = event.source_url();
            let Some(submission) = self.lookup_submission(&tor_url, &mut summary).await? else {
                continue;
            };

            if submission.removed_from_queue {
                debug!(submission_id = %submission.id, "submission has already been removed");
                summary.skipped += 1;
                continue;
            }

            let result = self.remote.mark_removed(submission.id).await;
            self.settle(SyncAction::RemoveRemote.as_str(), &submission, result, &mut summary)?;
        }

        info!(
            examined = summary.examined,
            writes_ok = summary.writes_ok,
            writes_failed = summary.writes_failed,
            "removal tracking finished"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Report tracking
    // -----------------------------------------------------------------------

    /// Mirror reports from the moderation queue, auto-resolving what can be
    /// settled by reconciling removal/NSFW/approval state instead.
    pub async fn track_reports(&self) -> Result<PassSummary, SyncError> {
        let pass = PassKind::Reports;
        let mut summary = PassSummary::new(pass);
        info!("tracking post reports");

        let items = self
            .queue
            .report_queue()
            .await
            .map_err(|source| SyncError::Enumeration { pass, source })?;

        for item in items {
            if self.should_stop() {
                summary.interrupted = true;
                break;
            }
            summary.examined += 1;

            if item.is_resolved() {
                summary.skipped += 1;
                continue;
            }

            // Reports can be retracted between enumeration and processing.
            let Some(reason) = item.active_report_reason().map(str::to_string) else {
                summary.skipped += 1;
                continue;
            };

            let tor_url = item.source_url();
            let Some(submission) = self.lookup_submission(&tor_url, &mut summary).await? else {
                continue;
            };

            if submission.report_handled() {
                debug!(
                    submission_id = %submission.id,
                    "report already resolved on the tracking side"
                );
                summary.skipped += 1;
                continue;
            }

            let Some(plan) = self
                .auto_resolve(&item, &submission, Some(&reason), &mut summary)
                .await?
            else {
                continue;
            };
            if plan.is_handled() {
                summary.auto_handled += 1;
                continue;
            }

            let result = self.remote.file_report(submission.id, &reason).await;
            match result {
                Ok(()) => {
                    info!(
                        submission_id = %submission.id,
                        tor_url = %submission.tor_url,
                        reason = %reason,
                        "reported submission to Blossom"
                    );
                    summary.record_write(true);
                    summary.reported += 1;
                }
                Err(err) => self.write_failed("report", &submission, err, &mut summary)?,
            }
        }

        info!(
            examined = summary.examined,
            auto_handled = summary.auto_handled,
            reported = summary.reported,
            "report tracking finished"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Auto-resolution
    // -----------------------------------------------------------------------

    /// Resolve the partner post, plan, and execute the plan's writes.
    ///
    /// `None` means the partner lookup failed transiently: the item is left
    /// untouched (no report) and retried next cycle. Any other lookup failure
    /// yields an empty, not-handled plan.
    pub async fn auto_resolve(
        &self,
        item: &QueueItem,
        submission: &Submission,
        reason: Option<&str>,
        summary: &mut PassSummary,
    ) -> Result<Option<ResolutionPlan>, SyncError> {
        let partner = match self.queue.resolve_partner(item).await {
            Ok(partner) => partner,
            Err(err) if err.is_rate_limited() => {
                return Err(SyncError::RateLimited {
                    pass: summary.pass,
                    retry_after: rate_limit_delay(&err),
                });
            }
            Err(err) if err.is_transient() => {
                warn!(
                    submission_id = %submission.id,
                    partner_url = %item.url,
                    error = %err,
                    "issue communicating while resolving partner post; skipping"
                );
                summary.lookup_failed += 1;
                return Ok(None);
            }
            Err(err) => {
                warn!(
                    submission_id = %submission.id,
                    partner_url = %item.url,
                    error = %err,
                    "could not resolve partner post"
                );
                summary.lookup_failed += 1;
                return Ok(Some(ResolutionPlan::not_handled(Vec::new())));
            }
        };

        if partner == PartnerLookup::Forbidden {
            warn!(
                submission_id = %submission.id,
                partner_url = %item.url,
                "partner post is in a private area; removing on both sides"
            );
        }

        let plan = plan_auto_resolution(item, submission, &partner, reason);
        for action in &plan.actions {
            self.apply(*action, item, submission, summary).await?;
        }

        if let Some(handled_by) = plan.handled_by {
            info!(
                submission_id = %submission.id,
                handled_by = ?handled_by,
                "report auto-resolved"
            );
        }
        Ok(Some(plan))
    }

    async fn apply(
        &self,
        action: SyncAction,
        item: &QueueItem,
        submission: &Submission,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        let result = match action {
            SyncAction::NsfwQueue => self.queue.mark_nsfw(item).await,
            SyncAction::NsfwRemote => self.remote.mark_nsfw(submission.id).await,
            SyncAction::RemoveQueue => self.queue.remove(item).await,
            SyncAction::RemoveRemote => self.remote.mark_removed(submission.id).await,
            SyncAction::ApproveQueue => self.queue.approve(item).await,
            SyncAction::ApproveRemote => self.remote.mark_approved(submission.id).await,
        };
        self.settle(action.as_str(), submission, result, summary)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Full sweep
    // -----------------------------------------------------------------------

    /// Proactive consistency pass over recent, unclaimed, not-removed submissions.
    pub async fn full_sweep(&self) -> Result<PassSummary, SyncError> {
        self.full_sweep_at(Utc::now()).await
    }

    /// [`full_sweep`](Self::full_sweep) with an explicit "now".
    pub async fn full_sweep_at(&self, now: DateTime<Utc>) -> Result<PassSummary, SyncError> {
        let pass = PassKind::FullSweep;
        let mut summary = PassSummary::new(pass);

        let filter = SubmissionFilter::sweep(now - self.settings.sweep_window);
        let page_size = self.settings.sweep_page_size.max(1);
        let mut page_no: u32 = 1;

        'pages: loop {
            let page = self
                .remote
                .list_page(&filter, page_no, page_size)
                .await
                .map_err(|source| SyncError::Enumeration { pass, source })?;
            summary.pages_fetched += 1;

            let fetched = page.fetched;
            for submission in &page.items {
                if self.should_stop() {
                    summary.interrupted = true;
                    break 'pages;
                }
                summary.examined += 1;
                self.sweep_one(submission, &mut summary).await?;

                if !self.settings.sweep_pacing.is_zero() {
                    tokio::time::sleep(self.settings.sweep_pacing).await;
                }
            }

            if !page.has_next || fetched < page_size as usize {
                break;
            }
            page_no += 1;
        }

        info!(
            pages = summary.pages_fetched,
            examined = summary.examined,
            auto_handled = summary.auto_handled,
            "full sweep finished"
        );
        Ok(summary)
    }

    async fn sweep_one(
        &self,
        submission: &Submission,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        let item = match self.queue.item_by_url(&submission.tor_url).await {
            Ok(Lookup::Found(item)) => item,
            Ok(Lookup::NotFound) => {
                warn!(
                    submission_id = %submission.id,
                    tor_url = %submission.tor_url,
                    "can't find queue item for submission"
                );
                summary.not_found += 1;
                return Ok(());
            }
            Err(err) => {
                self.lookup_failed(&submission.tor_url, err, summary)?;
                return Ok(());
            }
        };

        let Some(plan) = self.auto_resolve(&item, submission, None, summary).await? else {
            return Ok(());
        };
        if plan.is_handled() {
            summary.auto_handled += 1;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Join a source URL to its tracking-side submission. `None` means skip.
    pub(crate) async fn lookup_submission(
        &self,
        tor_url: &str,
        summary: &mut PassSummary,
    ) -> Result<Option<Submission>, SyncError> {
        match self.remote.find_by_url(tor_url).await {
            Ok(Lookup::Found(submission)) => Ok(Some(submission)),
            Ok(Lookup::NotFound) => {
                warn!(tor_url = %tor_url, "can't find submission in Blossom");
                summary.not_found += 1;
                Ok(None)
            }
            Err(err) => {
                self.lookup_failed(tor_url, err, summary)?;
                Ok(None)
            }
        }
    }

    pub(crate) fn lookup_failed(
        &self,
        tor_url: &str,
        err: StoreError,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        if err.is_rate_limited() {
            return Err(SyncError::RateLimited {
                pass: summary.pass,
                retry_after: rate_limit_delay(&err),
            });
        }
        warn!(tor_url = %tor_url, error = %err, "lookup failed; skipping item");
        summary.lookup_failed += 1;
        Ok(())
    }

    /// Log and count the outcome of a single write; `true` when it was applied.
    pub(crate) fn settle(
        &self,
        what: &str,
        submission: &Submission,
        result: Result<(), StoreError>,
        summary: &mut PassSummary,
    ) -> Result<bool, SyncError> {
        match result {
            Ok(()) => {
                info!(
                    submission_id = %submission.id,
                    tor_url = %submission.tor_url,
                    action = what,
                    "write applied"
                );
                summary.record_write(true);
                Ok(true)
            }
            Err(err) => self.write_failed(what, submission, err, summary).map(|()| false),
        }
    }

    pub(crate) fn write_failed(
        &self,
        what: &str,
        submission: &Submission,
        err: StoreError,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        if err.is_rate_limited() {
            return Err(SyncError::RateLimited {
                pass: summary.pass,
                retry_after: rate_limit_delay(&err),
            });
        }
        warn!(
            submission_id = %submission.id,
            tor_url = %submission.tor_url,
            action = what,
            status = ?err.status(),
            error = %err,
            "write failed"
        );
        summary.record_write(false);
        Ok(())
    }
}

fn rate_limit_delay(err: &StoreError) -> Option<Duration> {
    match err {
        StoreError::RateLimited { retry_after } => *retry_after,
        _ => None,
    }
}
