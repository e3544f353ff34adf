//! Question bank registration
//!
//! The question bank normally lives in an upstream authoring service; this
//! endpoint lets it (and tests) publish one assessment at a time.

use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use chrono::Utc;
use conceptlens_common::models::{Assessment, Question};
use serde::Deserialize;
use std::collections::HashSet;

use super::instructor::InstructorId;
use crate::db::assessments;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// PUT /assessments/:assessment_id request body
#[derive(Debug, Deserialize)]
pub struct RegisterAssessmentRequest {
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub questions: Vec<Question>,
}

/// PUT /assessments/:assessment_id
///
/// Creates the assessment for the calling instructor or replaces its
/// question list. Another instructor's assessment is 403.
pub async fn register_assessment(
    State(state): State<AppState>,
    InstructorId(instructor_id): InstructorId,
    Path(assessment_id): Path<String>,
    Json(request): Json<RegisterAssessmentRequest>,
) -> ApiResult<Json<Assessment>> {
    if request.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = request
        .questions
        .iter()
        .find(|q| !seen.insert(q.question_id.as_str()))
    {
        return Err(ApiError::BadRequest(format!(
            "Duplicate question id '{}'",
            dup.question_id
        )));
    }

    if let Some(owner) = assessments::assessment_owner(&state.db, &assessment_id).await? {
        if owner != instructor_id {
            return Err(ApiError::Forbidden(format!(
                "Assessment {} belongs to another instructor",
                assessment_id
            )));
        }
    }

    let assessment = Assessment {
        assessment_id: assessment_id.clone(),
        instructor_id,
        title: request.title,
        subject: request.subject,
        questions: request.questions,
        created_at: Utc::now(),
    };
    assessments::register_assessment(&state.db, &assessment).await?;

    let stored = assessments::load_assessment(&state.db, &assessment_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Assessment {} vanished after save", assessment_id)))?;

    Ok(Json(stored))
}

/// Build assessment routes
pub fn assessment_routes() -> Router<AppState> {
    Router::new().route("/assessments/:assessment_id", put(register_assessment))
}
