//! Ingestion entrypoint

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use conceptlens_common::models::SubmittedResponse;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::services::ingest::{ingest_submission, IngestReceipt};
use crate::AppState;

/// POST /ingest/responses request body
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub responses: Vec<SubmittedResponse>,
}

/// POST /ingest/responses
///
/// Returns 202 once the responses are graded and stored; clustering runs
/// later in the background. 409 when the student already submitted.
pub async fn ingest_responses(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestReceipt>)> {
    let receipt = ingest_submission(&state.db, &state.queue, request.responses).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/ingest/responses", post(ingest_responses))
}
