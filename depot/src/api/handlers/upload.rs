//! HTTP handler for multipart file uploads.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::AppState;
use crate::errors::{Error, Result};
use crate::multipart::Multipart;
use crate::pipeline::UploadPipeline;

/// POST /upload - stream a multipart body through the upload pipeline.
///
/// The body is never buffered whole: parts are parsed, validated and copied
/// to storage incrementally. Returns a plain-text per-part summary with
/// `200` when the body yielded at least one part (rejected parts are still
/// reported with `200`; the request itself succeeded structurally), `400`
/// when the request is not well-formed multipart or contains no parts.
#[instrument(skip_all)]
pub async fn upload(State(state): State<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();

    // Header validation happens before a single body byte is read.
    let mut multipart = Multipart::new(&parts.headers, body.into_data_stream(), state.config.uploads.read_buffer_size)?;

    // The pipeline runs in its own task so that a client disconnect - which
    // drops this handler's future - cannot cancel it mid-write. The task
    // observes the disconnect as a transport read error and removes the
    // in-progress destination file before finishing.
    let policy = state.config.uploads.clone();
    let store = state.store.clone();
    let outcomes = tokio::spawn(async move { UploadPipeline::new(&policy, &store).run(&mut multipart).await })
        .await
        .map_err(|e| Error::Internal {
            operation: format!("run upload pipeline task: {e}"),
        })??;

    if outcomes.is_empty() {
        return Err(Error::EmptyBody);
    }

    let mut summary = String::new();
    for outcome in &outcomes {
        summary.push_str(&outcome.summary_line());
        summary.push('\n');
    }

    Ok((StatusCode::OK, summary).into_response())
}
