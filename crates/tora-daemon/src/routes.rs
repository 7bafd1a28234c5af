//! Axum router and HTTP handlers for tora-daemon.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! layers after the call so tests can drive the bare router.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{ControlRefusedResponse, ControlResponse, HealthResponse},
    state::{AppState, BusMsg, SchedulerState},
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/cycle/trigger", post(cycle_trigger))
        .route("/v1/drain/enable", post(drain_enable))
        .route("/v1/drain/disable", post(drain_disable))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.snapshot().await;
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/cycle/trigger
// ---------------------------------------------------------------------------

/// Run a cycle at the next poll instead of waiting for the deadline.
pub(crate) async fn cycle_trigger(State(st): State<Arc<AppState>>) -> Response {
    let state = st.snapshot().await.state;
    if let Some(refused) = refuse_control(&st, state) {
        return refused;
    }

    st.control.trigger();
    info!("cycle/trigger");
    st.publish_log("INFO", "cycle triggered by operator");
    control_ok(&st, state).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/drain/enable  /v1/drain/disable
// ---------------------------------------------------------------------------

pub(crate) async fn drain_enable(State(st): State<Arc<AppState>>) -> Response {
    set_drain(&st, true).await
}

pub(crate) async fn drain_disable(State(st): State<Arc<AppState>>) -> Response {
    set_drain(&st, false).await
}

async fn set_drain(st: &AppState, on: bool) -> Response {
    let state = st.snapshot().await.state;
    if let Some(refused) = refuse_control(st, state) {
        return refused;
    }

    st.control.set_drain(on);
    st.status.write().await.drain = on;
    info!(drain = on, "drain mode changed");
    st.publish_log(
        "INFO",
        if on {
            "clear the queue mode enabled"
        } else {
            "clear the queue mode disabled"
        },
    );
    control_ok(st, state).into_response()
}

fn refuse_control(st: &AppState, state: SchedulerState) -> Option<Response> {
    let reason = if st.control.is_stopping() {
        "daemon is shutting down"
    } else if state == SchedulerState::Noop {
        "daemon runs in noop mode"
    } else {
        return None;
    };
    Some(
        (
            StatusCode::CONFLICT,
            Json(ControlRefusedResponse {
                error: reason.to_string(),
                state,
            }),
        )
            .into_response(),
    )
}

fn control_ok(st: &AppState, state: SchedulerState) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ControlResponse {
            ok: true,
            drain: st.control.drain(),
            trigger_pending: st.control.trigger_pending(),
            state,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        // lagged or closed receivers drop the message
        let m = msg.ok()?;
        let data = serde_json::to_string(&m).ok()?;
        Some(Ok(Event::default().event(m.event_name()).data(data)))
    })
}
