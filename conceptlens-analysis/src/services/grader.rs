//! Response grading
//!
//! An answer is correct when it equals the question's canonical answer after
//! trimming and lower-casing both sides. Grading never fails: an unknown
//! assessment or question grades as incorrect.

use chrono::{DateTime, Utc};
use conceptlens_common::models::{Assessment, StudentResponse, SubmittedResponse};
use uuid::Uuid;

/// Exact, case-insensitive answer comparison
pub fn grade_answer(correct_answer: &str, submitted: &str) -> bool {
    correct_answer.trim().to_lowercase() == submitted.trim().to_lowercase()
}

/// Grade one submitted answer against an optional question bank
pub fn grade_response(
    assessment: Option<&Assessment>,
    submitted: SubmittedResponse,
    received_at: DateTime<Utc>,
) -> StudentResponse {
    let is_correct = assessment
        .and_then(|a| a.question(&submitted.question_id))
        .map(|q| grade_answer(&q.correct_answer, &submitted.response_text))
        .unwrap_or(false);

    StudentResponse {
        response_id: Uuid::new_v4(),
        student_id: submitted.student_id,
        assessment_id: submitted.assessment_id,
        question_id: submitted.question_id,
        response_text: submitted.response_text,
        is_correct,
        processed: false,
        submitted_at: submitted.submitted_at.unwrap_or(received_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptlens_common::models::Question;

    fn bank() -> Assessment {
        Assessment {
            assessment_id: "a1".to_string(),
            instructor_id: "prof".to_string(),
            title: "Quiz".to_string(),
            subject: None,
            questions: vec![Question {
                question_id: "q1".to_string(),
                text: "Which key uniquely identifies a row?".to_string(),
                correct_answer: "Primary Key".to_string(),
                options: vec![],
            }],
            created_at: Utc::now(),
        }
    }

    fn submitted(question_id: &str, text: &str) -> SubmittedResponse {
        SubmittedResponse {
            student_id: "s1".to_string(),
            assessment_id: "a1".to_string(),
            question_id: question_id.to_string(),
            response_text: text.to_string(),
            submitted_at: None,
        }
    }

    #[test]
    fn test_match_ignores_case_and_surrounding_whitespace() {
        assert!(grade_answer("Primary Key", "  primary key\n"));
        assert!(!grade_answer("Primary Key", "primarykey"));
    }

    #[test]
    fn test_graded_response_is_unprocessed() {
        let now = Utc::now();
        let graded = grade_response(Some(&bank()), submitted("q1", "PRIMARY KEY"), now);
        assert!(graded.is_correct);
        assert!(!graded.processed);
        assert_eq!(graded.submitted_at, now);
    }

    #[test]
    fn test_unresolvable_assessment_or_question_grades_incorrect() {
        let now = Utc::now();
        assert!(!grade_response(None, submitted("q1", "Primary Key"), now).is_correct);
        assert!(!grade_response(Some(&bank()), submitted("q9", ""), now).is_correct);
    }
}
