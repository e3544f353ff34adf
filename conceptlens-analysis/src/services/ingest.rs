//! Response ingestion: validate → duplicate check → grade → persist → enqueue
//!
//! A batch belongs to exactly one (student, assessment) pair. The analysis
//! run is scheduled after the responses are committed; its outcome is never
//! reported back to the submitter.

use chrono::Utc;
use conceptlens_common::models::SubmittedResponse;
use conceptlens_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use super::analysis_queue::{AnalysisQueue, EnqueueOutcome};
use super::grader::grade_response;
use crate::db::{assessments, responses};

/// Acknowledgment returned to the submitter
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub student_id: String,
    pub assessment_id: String,
    pub responses_accepted: usize,
    pub responses_correct: usize,
    /// "queued", "coalesced" or "not_scheduled"
    pub analysis: &'static str,
}

/// (student_id, assessment_id) shared by every response in the batch
pub fn batch_owner(batch: &[SubmittedResponse]) -> Result<(String, String)> {
    let first = batch
        .first()
        .ok_or_else(|| Error::InvalidInput("Submission contains no responses".to_string()))?;

    if first.student_id.trim().is_empty() || first.assessment_id.trim().is_empty() {
        return Err(Error::InvalidInput(
            "student_id and assessment_id are required".to_string(),
        ));
    }

    let mixed = batch
        .iter()
        .any(|r| r.student_id != first.student_id || r.assessment_id != first.assessment_id);
    if mixed {
        return Err(Error::InvalidInput(
            "All responses in a submission must share one student and assessment".to_string(),
        ));
    }

    Ok((first.student_id.clone(), first.assessment_id.clone()))
}

/// Accept one student's submission and schedule analysis
pub async fn ingest_submission(
    pool: &SqlitePool,
    queue: &AnalysisQueue,
    batch: Vec<SubmittedResponse>,
) -> Result<IngestReceipt> {
    let (student_id, assessment_id) = batch_owner(&batch)?;

    if responses::submission_exists(pool, &student_id, &assessment_id).await? {
        return Err(responses::duplicate_submission(&student_id, &assessment_id));
    }

    let assessment = match assessments::load_assessment(pool, &assessment_id).await {
        Ok(assessment) => assessment,
        Err(e) => {
            tracing::warn!(
                assessment_id = %assessment_id,
                error = %e,
                "Question bank unavailable, grading all responses incorrect"
            );
            None
        }
    };
    if assessment.is_none() {
        tracing::debug!(assessment_id = %assessment_id, "Grading against unknown assessment");
    }

    let received_at = Utc::now();
    let graded: Vec<_> = batch
        .into_iter()
        .map(|submitted| grade_response(assessment.as_ref(), submitted, received_at))
        .collect();
    let responses_correct = graded.iter().filter(|r| r.is_correct).count();

    responses::store_submission(pool, &student_id, &assessment_id, received_at, &graded).await?;

    tracing::info!(
        student_id = %student_id,
        assessment_id = %assessment_id,
        responses = graded.len(),
        correct = responses_correct,
        "Submission accepted"
    );

    let analysis = match queue.enqueue(&assessment_id).await {
        Ok(EnqueueOutcome::Queued) => "queued",
        Ok(EnqueueOutcome::Coalesced) => "coalesced",
        Err(e) => {
            tracing::warn!(assessment_id = %assessment_id, error = %e, "Analysis not scheduled");
            "not_scheduled"
        }
    };

    Ok(IngestReceipt {
        student_id,
        assessment_id,
        responses_accepted: graded.len(),
        responses_correct,
        analysis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(student: &str, assessment: &str) -> SubmittedResponse {
        SubmittedResponse {
            student_id: student.to_string(),
            assessment_id: assessment.to_string(),
            question_id: "q1".to_string(),
            response_text: "x".to_string(),
            submitted_at: None,
        }
    }

    #[test]
    fn test_batch_owner_requires_single_pair() {
        let ok = vec![submitted("s1", "a1"), submitted("s1", "a1")];
        assert_eq!(batch_owner(&ok).unwrap(), ("s1".to_string(), "a1".to_string()));

        let mixed = vec![submitted("s1", "a1"), submitted("s2", "a1")];
        assert!(matches!(batch_owner(&mixed), Err(Error::InvalidInput(_))));

        assert!(matches!(batch_owner(&[]), Err(Error::InvalidInput(_))));
        assert!(matches!(batch_owner(&[submitted(" ", "a1")]), Err(Error::InvalidInput(_))));
    }
}
