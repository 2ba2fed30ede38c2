use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::latency::LatencySnapshot;
use crate::error::AppError;
use crate::state::WatcherState;
use crate::watcher::{CycleOutcome, CycleReport, Watcher};

#[derive(Clone)]
pub struct ApiState {
    pub watcher: Arc<Watcher>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/state", get(get_state))
        .route("/check", post(post_check))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub symbols: Vec<String>,
    pub cycle_in_progress: bool,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    /// Unix nanoseconds, null before the first cycle.
    pub last_cycle_started_ns: Option<u64>,
    pub last_cycle_finished_ns: Option<u64>,
    pub last_cycle_new_filings: u64,
    pub fetch_failures: u64,
    pub notify_failures: u64,
    pub fetch_latency: LatencySnapshot,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let watcher = &state.watcher;
    let health = watcher.health();

    Json(HealthResponse {
        symbols: watcher.symbols().to_vec(),
        cycle_in_progress: watcher.is_cycle_running(),
        cycles_completed: health.cycles_completed(),
        cycles_skipped: health.cycles_skipped(),
        last_cycle_started_ns: non_zero(health.last_cycle_started_ns()),
        last_cycle_finished_ns: non_zero(health.last_cycle_finished_ns()),
        last_cycle_new_filings: health.last_cycle_new_filings(),
        fetch_failures: health.fetch_failures(),
        notify_failures: health.notify_failures(),
        fetch_latency: watcher.fetch_latency().snapshot(),
    })
}

/// The persisted state file as the store reads it (legacy files show as empty).
async fn get_state(State(state): State<ApiState>) -> Json<WatcherState> {
    Json(state.watcher.store().load())
}

/// Runs a cycle now. Answers 409 if one is already running.
///
/// The cycle runs on its own task so a client that hangs up does not cancel
/// it between committing state and notifying.
async fn post_check(State(state): State<ApiState>) -> Result<Json<CycleReport>, AppError> {
    let watcher = Arc::clone(&state.watcher);
    match tokio::spawn(async move { watcher.run_cycle().await }).await?? {
        CycleOutcome::Completed(report) => Ok(Json(report)),
        CycleOutcome::Skipped => Err(AppError::CycleInProgress),
    }
}

fn non_zero(ns: u64) -> Option<u64> {
    (ns != 0).then_some(ns)
}
