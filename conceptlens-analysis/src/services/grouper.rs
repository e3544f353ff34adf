//! Partition an analysis run's responses by question

use conceptlens_common::config::SeedOrder;
use conceptlens_common::models::StudentResponse;
use conceptlens_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::responses;

/// All incorrect responses to one question, in seed order
#[derive(Debug, Clone)]
pub struct QuestionGroup {
    pub question_id: String,
    pub responses: Vec<StudentResponse>,
}

impl QuestionGroup {
    /// Responses not yet folded into a stored clustering
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.responses
            .iter()
            .filter(|r| !r.processed)
            .map(|r| r.response_id)
            .collect()
    }
}

/// Group responses by question id
///
/// Correct responses are discarded. A question is kept only while at least
/// one of its responses is unprocessed, and then with its processed
/// responses too. Groups appear in order of each question's first response;
/// order within a group is kept.
pub fn group_by_question(responses: Vec<StudentResponse>) -> Vec<QuestionGroup> {
    let mut groups: Vec<QuestionGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for response in responses {
        if response.is_correct {
            continue;
        }
        match index.get(&response.question_id) {
            Some(&i) => groups[i].responses.push(response),
            None => {
                index.insert(response.question_id.clone(), groups.len());
                groups.push(QuestionGroup {
                    question_id: response.question_id.clone(),
                    responses: vec![response],
                });
            }
        }
    }

    groups.retain(|g| g.responses.iter().any(|r| !r.processed));
    groups
}

/// Load and group the incorrect responses of questions needing re-clustering
pub async fn load_question_groups(
    pool: &SqlitePool,
    assessment_id: &str,
    order: SeedOrder,
) -> Result<Vec<QuestionGroup>> {
    let incorrect = responses::load_incorrect(pool, assessment_id, order).await?;
    Ok(group_by_question(incorrect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn response(question: &str, correct: bool, processed: bool) -> StudentResponse {
        StudentResponse {
            response_id: Uuid::new_v4(),
            student_id: "s1".to_string(),
            assessment_id: "a1".to_string(),
            question_id: question.to_string(),
            response_text: "x".to_string(),
            is_correct: correct,
            processed,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let input = vec![
            response("q2", false, false),
            response("q1", false, false),
            response("q2", false, false),
        ];
        let first = input[0].response_id;

        let groups = group_by_question(input);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].question_id, "q2");
        assert_eq!(groups[0].responses.len(), 2);
        assert_eq!(groups[0].responses[0].response_id, first);
        assert_eq!(groups[1].question_id, "q1");
    }

    #[test]
    fn test_question_without_new_responses_is_absent() {
        let input = vec![
            response("q1", true, false),
            response("q2", false, true),
            response("q3", false, false),
        ];

        let groups = group_by_question(input);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].question_id, "q3");
    }

    #[test]
    fn test_new_response_brings_back_processed_ones() {
        let input = vec![
            response("q1", false, true),
            response("q1", false, true),
            response("q1", true, false),
            response("q1", false, false),
        ];
        let fresh = input[3].response_id;

        let groups = group_by_question(input);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].responses.len(), 3);
        assert_eq!(groups[0].pending_ids(), vec![fresh]);
    }
}
