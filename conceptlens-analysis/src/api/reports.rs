//! Read entrypoints: the enriched misconception report, topic trends across
//! assessments, and per-assessment participation summaries

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::instructor::InstructorId;
use crate::error::ApiResult;
use crate::services::report::{
    generate_assessment_summaries, generate_report, generate_trends, AssessmentReport,
    AssessmentSummary, ReportStatus, TrendReport,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// valid (default), pending, rejected or all
    pub status: Option<String>,
    pub assessment_id: Option<String>,
}

/// GET /reports/misconceptions
///
/// One section per owned assessment that has misconceptions.
pub async fn misconception_report(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<Vec<AssessmentReport>>> {
    let status = match query.status.as_deref() {
        Some(raw) => raw.parse::<ReportStatus>()?,
        None => ReportStatus::default(),
    };

    let report = generate_report(
        &state.db,
        &instructor_id,
        status,
        query.assessment_id.as_deref(),
    )
    .await?;

    Ok(Json(report))
}

/// GET /reports/trends
pub async fn trend_report(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
) -> ApiResult<Json<TrendReport>> {
    Ok(Json(generate_trends(&state.db, &instructor_id).await?))
}

/// GET /assessments
pub async fn assessment_summaries(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
) -> ApiResult<Json<Vec<AssessmentSummary>>> {
    Ok(Json(generate_assessment_summaries(&state.db, &instructor_id).await?))
}

/// Build report routes
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/reports/misconceptions", get(misconception_report))
        .route("/reports/trends", get(trend_report))
        .route("/assessments", get(assessment_summaries))
}
