//! Request and response types for the tora-daemon HTTP endpoints.
//!
//! No business logic lives here.

use serde::{Deserialize, Serialize};

use crate::state::SchedulerState;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/cycle/trigger  /v1/drain/enable  /v1/drain/disable
// ---------------------------------------------------------------------------

/// Response for the operator control endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    pub drain: bool,
    /// A cycle will start at the next poll.
    pub trigger_pending: bool,
    pub state: SchedulerState,
}

/// Refusal body (409) when the daemon is shutting down or in noop mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRefusedResponse {
    pub error: String,
    pub state: SchedulerState,
}
