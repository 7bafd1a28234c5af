//! Shared runtime state for tora-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; the scheduler holds
//! the same `Arc` and publishes cycle results through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use tora_reconcile::PassSummary;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    Cycle(CycleReport),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Status(_) => "status",
            BusMsg::Cycle(_) => "cycle",
            BusMsg::LogLine { .. } => "log",
        }
    }

    pub fn log(level: &str, msg: impl Into<String>) -> Self {
        BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// CycleReport
// ---------------------------------------------------------------------------

/// What one scheduler cycle did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ran in clear-the-queue mode.
    pub drain: bool,
    /// Summaries of the passes that ran, in order.
    pub passes: Vec<PassSummary>,
    /// Steps switched off or not due this cycle.
    pub skipped_steps: Vec<String>,
    /// Error that ended the cycle early, if any.
    pub error: Option<String>,
    pub backoff_secs: Option<u64>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Scheduler lifecycle state reported by `/v1/status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Starting,
    Idle,
    Running,
    Backoff,
    Noop,
    Stopping,
    Stopped,
}

/// Point-in-time snapshot of daemon state, returned by GET /v1/status and
/// carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub state: SchedulerState,
    pub cycle_count: u64,
    pub last_cycle: Option<CycleReport>,
    pub drain: bool,
    pub noop: bool,
    pub debug: bool,
    /// Moderation area being synced.
    pub subreddit: Option<String>,
    pub config_hash: Option<String>,
}

/// Run modes fixed at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartupFlags {
    pub drain: bool,
    pub noop: bool,
    pub debug: bool,
    pub subreddit: Option<String>,
    pub config_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// SchedulerControl
// ---------------------------------------------------------------------------

/// Operator switches shared between the HTTP surface and the scheduler loop.
#[derive(Debug)]
pub struct SchedulerControl {
    trigger: AtomicBool,
    drain: AtomicBool,
    /// Shared with the engine so running passes stop between items.
    stop: Arc<AtomicBool>,
}

impl SchedulerControl {
    pub fn new(drain: bool, stop: Arc<AtomicBool>) -> Self {
        Self {
            trigger: AtomicBool::new(false),
            drain: AtomicBool::new(drain),
            stop,
        }
    }

    /// Ask the loop to run a cycle at the next poll regardless of the deadline.
    pub fn trigger(&self) {
        self.trigger.store(true, Ordering::SeqCst);
    }

    pub fn trigger_pending(&self) -> bool {
        self.trigger.load(Ordering::SeqCst)
    }

    pub(crate) fn take_trigger(&self) -> bool {
        self.trigger.swap(false, Ordering::SeqCst)
    }

    pub fn set_drain(&self, on: bool) {
        self.drain.store(on, Ordering::SeqCst);
    }

    pub fn drain(&self) -> bool {
        self.drain.load(Ordering::SeqCst)
    }

    /// Cooperative shutdown: the current item finishes, then the loop exits.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers and the scheduler.
#[derive(Clone)]
pub struct AppState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub control: Arc<SchedulerControl>,
}

impl AppState {
    /// `stop` should be the engine's stop handle so a shutdown request
    /// also interrupts a running pass.
    pub fn new(flags: StartupFlags, stop: Arc<AtomicBool>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            state: SchedulerState::Starting,
            cycle_count: 0,
            last_cycle: None,
            drain: flags.drain,
            noop: flags.noop,
            debug: flags.debug,
            subreddit: flags.subreddit,
            config_hash: flags.config_hash,
        };

        Self {
            bus,
            build: BuildInfo {
                service: "tora-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: Arc::new(RwLock::new(initial_status)),
            control: Arc::new(SchedulerControl::new(flags.drain, stop)),
        }
    }

    /// Current snapshot with live uptime and drain flag.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let mut snap = self.status.read().await.clone();
        snap.daemon_uptime_secs = uptime_secs();
        snap.drain = self.control.drain();
        snap
    }

    /// Update the lifecycle state and broadcast the new snapshot.
    pub async fn set_state(&self, state: SchedulerState) {
        self.status.write().await.state = state;
        let snap = self.snapshot().await;
        let _ = self.bus.send(BusMsg::Status(snap));
    }

    /// Record a finished cycle and broadcast it.
    pub async fn record_cycle(&self, report: CycleReport) {
        {
            let mut s = self.status.write().await;
            s.cycle_count = report.cycle;
            s.last_cycle = Some(report.clone());
        }
        let _ = self.bus.send(BusMsg::Cycle(report));
    }

    pub fn publish_log(&self, level: &str, msg: impl Into<String>) {
        let _ = self.bus.send(BusMsg::log(level, msg));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
