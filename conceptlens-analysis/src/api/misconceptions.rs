//! Misconception listing, detail, triage and audit endpoints
//!
//! All routes are scoped to the calling instructor's assessments.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use conceptlens_common::models::{AuditEntry, Misconception, MisconceptionStatus};
use serde::{Deserialize, Serialize};

use super::instructor::InstructorId;
use crate::db::misconceptions::{count_by_status, list_misconceptions, MisconceptionFilter};
use crate::db::{audit, responses};
use crate::error::ApiResult;
use crate::services::report::{enrich_single, MisconceptionCard, ReportStatus};
use crate::services::triage::{apply_triage, load_owned, parse_misconception_id};
use crate::AppState;

/// Query parameters for GET /misconceptions
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// pending (default), valid, rejected or all
    pub status: Option<String>,
    pub assessment_id: Option<String>,
}

/// POST /misconceptions/:id/triage request body
#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    pub action: String,
    #[serde(default)]
    pub new_label: Option<String>,
}

/// GET /misconceptions/stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pending: i64,
    pub valid: i64,
    pub rejected: i64,
    pub total_responses: i64,
}

/// GET /misconceptions
pub async fn list(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Misconception>>> {
    let status = match query.status.as_deref() {
        Some(raw) => raw.parse::<ReportStatus>()?,
        None => ReportStatus::Only(MisconceptionStatus::Pending),
    };

    let filter = MisconceptionFilter {
        status: match status {
            ReportStatus::Only(status) => Some(status),
            ReportStatus::All => None,
        },
        assessment_id: query.assessment_id,
        instructor_id: Some(instructor_id),
    };

    Ok(Json(list_misconceptions(&state.db, &filter).await?))
}

/// GET /misconceptions/stats
pub async fn stats(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
) -> ApiResult<Json<StatsResponse>> {
    let counts = count_by_status(&state.db, &instructor_id).await?;
    let total_responses = responses::count_instructor_responses(&state.db, &instructor_id).await?;

    Ok(Json(StatsResponse {
        pending: counts.pending,
        valid: counts.valid,
        rejected: counts.rejected,
        total_responses,
    }))
}

/// GET /misconceptions/:id
pub async fn detail(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
    Path(id): Path<String>,
) -> ApiResult<Json<MisconceptionCard>> {
    let id = parse_misconception_id(&id)?;
    let misconception = load_owned(&state.db, id, &instructor_id).await?;
    Ok(Json(enrich_single(&state.db, &misconception).await?))
}

/// POST /misconceptions/:id/triage
pub async fn triage(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
    Path(id): Path<String>,
    Json(request): Json<TriageRequest>,
) -> ApiResult<Json<Misconception>> {
    let updated = apply_triage(
        &state.db,
        &id,
        &request.action,
        request.new_label.as_deref(),
        &instructor_id,
    )
    .await?;

    Ok(Json(updated))
}

/// GET /misconceptions/:id/audit
pub async fn audit_trail(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    let id = parse_misconception_id(&id)?;
    load_owned(&state.db, id, &instructor_id).await?;
    Ok(Json(audit::list_entries(&state.db, id).await?))
}

/// Build misconception routes
pub fn misconception_routes() -> Router<AppState> {
    Router::new()
        .route("/misconceptions", get(list))
        .route("/misconceptions/stats", get(stats))
        .route("/misconceptions/:id", get(detail))
        .route("/misconceptions/:id/triage", post(triage))
        .route("/misconceptions/:id/audit", get(audit_trail))
}
