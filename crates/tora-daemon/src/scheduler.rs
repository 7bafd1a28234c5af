//! The scheduler loop.
//!
//! One cycle runs the enabled steps in order:
//!
//! ```text
//! archive completed -> archive expired   (every n-th cycle)
//! track removals -> track reports -> full sweep
//! ```
//!
//! Cycles start when the `sleep_until` deadline passes, when an operator
//! triggers one, or back to back in clear-the-queue mode. The loop wakes
//! every `idle_poll` so a shutdown request is honored quickly. Any
//! `SyncError` ends the cycle early and the loop backs off before the next.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use tora_config::{FeatureToggles, ScheduleSettings};
use tora_reconcile::{
    archive_completed, process_expired, PassSummary, ReconcileEngine, RemoteSubmissionStore,
    SourceQueueStore, SyncError, VolunteerId,
};

use crate::state::{AppState, CycleReport, SchedulerState};

/// Interval between noop-mode heartbeats.
pub const NOOP_INTERVAL: Duration = Duration::from_secs(10);

/// Delay before the next cycle after `err`.
///
/// A rate limit with a known delay waits that long plus one second; anything
/// else waits `transient_backoff`.
pub fn backoff_for(err: &SyncError, schedule: &ScheduleSettings) -> Duration {
    match err {
        SyncError::RateLimited {
            retry_after: Some(delay),
            ..
        } => *delay + Duration::from_secs(1),
        _ => schedule.transient_backoff,
    }
}

/// Archival runs on cycles 1, 1 + n, 1 + 2n, ...
pub fn archive_due(cycle: u64, every_n: u32) -> bool {
    let n = u64::from(every_n.max(1));
    cycle.saturating_sub(1) % n == 0
}

pub struct Scheduler<R, Q> {
    engine: Arc<ReconcileEngine<R, Q>>,
    app: Arc<AppState>,
    schedule: ScheduleSettings,
    features: FeatureToggles,
    /// OCR bot account; its transcriptions are never linked from the archive.
    ocr_bot: Option<VolunteerId>,
}

impl<R, Q> Scheduler<R, Q>
where
    R: RemoteSubmissionStore,
    Q: SourceQueueStore,
{
    pub fn new(
        engine: Arc<ReconcileEngine<R, Q>>,
        app: Arc<AppState>,
        schedule: ScheduleSettings,
        features: FeatureToggles,
        ocr_bot: Option<VolunteerId>,
    ) -> Self {
        Self {
            engine,
            app,
            schedule,
            features,
            ocr_bot,
        }
    }

    /// Run cycles until a stop is requested. At most `max_cycles` cycles run
    /// when given.
    pub async fn run(&self, max_cycles: Option<u64>) {
        let control = Arc::clone(&self.app.control);
        // Jumpstart the clock: the first cycle runs immediately.
        let mut sleep_until: Option<Instant> = None;
        let mut cycle: u64 = 0;

        self.app.set_state(SchedulerState::Idle).await;

        while !control.is_stopping() {
            if max_cycles.is_some_and(|max| cycle >= max) {
                break;
            }

            let drain = control.drain();
            let triggered = control.take_trigger();
            let waiting = sleep_until.is_some_and(|deadline| Instant::now() < deadline);
            if waiting && !drain && !triggered {
                tokio::time::sleep(self.schedule.idle_poll).await;
                continue;
            }

            if drain {
                info!("clear the queue mode is engaged");
            } else {
                sleep_until = Some(Instant::now() + self.schedule.cycle_interval);
            }

            cycle += 1;
            self.app.set_state(SchedulerState::Running).await;
            let report = self.run_cycle(cycle, drain).await;
            let backoff = report.backoff_secs.map(Duration::from_secs);
            self.app.record_cycle(report).await;

            if let Some(delay) = backoff {
                self.app.set_state(SchedulerState::Backoff).await;
                self.pause(delay).await;
            } else if !drain {
                info!("finished cycle; sleeping");
            }
            self.app.set_state(SchedulerState::Idle).await;
        }

        self.app.set_state(SchedulerState::Stopped).await;
        info!(cycles = cycle, "scheduler stopped");
    }

    /// Run a single cycle and report what it did. Never fails: errors end
    /// the cycle early and set `backoff_secs`.
    pub async fn run_cycle(&self, cycle: u64, drain: bool) -> CycleReport {
        let started_at = Utc::now();
        let mut passes = Vec::new();
        let mut skipped_steps = Vec::new();
        let archival = archive_due(cycle, self.schedule.archive_every_n_cycles);

        info!(cycle, archival, "starting cycle");

        let outcome = self
            .run_steps(archival, &mut passes, &mut skipped_steps)
            .await;

        let (error, backoff_secs) = match outcome {
            Ok(()) => (None, None),
            Err(err) => {
                let delay = backoff_for(&err, &self.schedule);
                match &err {
                    SyncError::RateLimited { .. } => warn!(
                        error = %err,
                        delay_secs = delay.as_secs(),
                        "rate limited; sleeping for requested time"
                    ),
                    SyncError::Enumeration { .. } => warn!(
                        error = %err,
                        delay_secs = delay.as_secs(),
                        "issue communicating with remote; backing off"
                    ),
                }
                self.app.publish_log("WARN", format!("cycle {cycle}: {err}"));
                (Some(err.to_string()), Some(delay.as_secs()))
            }
        };

        CycleReport {
            cycle,
            started_at,
            finished_at: Utc::now(),
            drain,
            passes,
            skipped_steps,
            error,
            backoff_secs,
        }
    }

    async fn run_steps(
        &self,
        archival: bool,
        passes: &mut Vec<PassSummary>,
        skipped: &mut Vec<String>,
    ) -> Result<(), SyncError> {
        let engine = self.engine.as_ref();
        let f = self.features;

        if !archival {
            skipped.push("archival_not_due".to_string());
        } else {
            if f.archive_completed {
                self.step(passes, archive_completed(engine, self.ocr_bot).await?);
            } else {
                info!("archiving of completed posts is disabled");
                skipped.push("archive_completed".to_string());
            }
            if self.stopping() {
                return Ok(());
            }

            if f.archive_expired {
                self.step(passes, process_expired(engine).await?);
            } else {
                info!("archiving of expired posts is disabled");
                skipped.push("archive_expired".to_string());
            }
        }
        if self.stopping() {
            return Ok(());
        }

        if f.track_removals {
            self.step(passes, engine.track_removals().await?);
        } else {
            info!("tracking of post removals is disabled");
            skipped.push("track_removals".to_string());
        }
        if self.stopping() {
            return Ok(());
        }

        if f.track_reports {
            self.step(passes, engine.track_reports().await?);
        } else {
            info!("tracking of post reports is disabled");
            skipped.push("track_reports".to_string());
        }
        if self.stopping() {
            return Ok(());
        }

        if f.full_sweep {
            self.step(passes, engine.full_sweep().await?);
        } else {
            info!("full sweep is disabled");
            skipped.push("full_sweep".to_string());
        }
        Ok(())
    }

    fn step(&self, passes: &mut Vec<PassSummary>, summary: PassSummary) {
        self.app.publish_log(
            "INFO",
            format!(
                "{}: examined={} writes_ok={} writes_failed={}",
                summary.pass, summary.examined, summary.writes_ok, summary.writes_failed
            ),
        );
        passes.push(summary);
    }

    fn stopping(&self) -> bool {
        self.app.control.is_stopping()
    }

    /// Sleep for `total`, waking every `idle_poll` to honor shutdown.
    async fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let chunk = (deadline - now).min(self.schedule.idle_poll);
            tokio::time::sleep(chunk).await;
        }
    }
}

/// Noop mode: take no action, only prove the process is alive.
pub async fn run_noop(app: Arc<AppState>) {
    app.set_state(SchedulerState::Noop).await;
    while !app.control.is_stopping() {
        tokio::time::sleep(NOOP_INTERVAL).await;
        info!("loop");
        app.publish_log("INFO", "noop loop");
    }
    app.set_state(SchedulerState::Stopped).await;
}
