//! Liveness probe.

use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode};
use tracing::{debug, error, instrument};

use crate::AppState;

/// A self-check slower than this reports the process as unhealthy.
const SELF_CHECK_BUDGET: Duration = Duration::from_secs(10);

/// GET /healthz - liveness probe for orchestrators.
///
/// Verifies the upload directory is still reachable and that the check
/// completes within a latency budget; a wedged disk shows up here before it
/// shows up as failed uploads.
#[instrument(skip_all)]
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let started = Instant::now();
    let check = tokio::fs::metadata(state.store.root()).await;
    let elapsed = started.elapsed();

    match check {
        Ok(_) if elapsed <= SELF_CHECK_BUDGET => {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "healthz check passed");
            (StatusCode::OK, "ok")
        }
        Ok(_) => {
            error!(elapsed_ms = elapsed.as_millis() as u64, "healthz self-check exceeded latency budget");
            (StatusCode::INTERNAL_SERVER_ERROR, "error: self-check too slow")
        }
        Err(e) => {
            error!(error = %e, "healthz check failed: upload directory unreachable");
            (StatusCode::INTERNAL_SERVER_ERROR, "error: storage unavailable")
        }
    }
}
