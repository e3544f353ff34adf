//! Graded response persistence

use chrono::{DateTime, Utc};
use conceptlens_common::config::SeedOrder;
use conceptlens_common::models::StudentResponse;
use conceptlens_common::{Error, Result};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};

/// Bound parameters per IN (...) statement
const IN_CHUNK: usize = 500;

/// Whether the (student, assessment) pair already has a submission on file
pub async fn submission_exists(
    pool: &SqlitePool,
    student_id: &str,
    assessment_id: &str,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM submissions WHERE student_id = ? AND assessment_id = ?",
    )
    .bind(student_id)
    .bind(assessment_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Persist one student's graded submission atomically
///
/// The `submissions` primary key rejects a second batch for the same pair
/// even when two requests race past the pre-check; that surfaces as
/// `Error::Conflict` and nothing is written.
pub async fn store_submission(
    pool: &SqlitePool,
    student_id: &str,
    assessment_id: &str,
    submitted_at: DateTime<Utc>,
    responses: &[StudentResponse],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO submissions (student_id, assessment_id, submitted_at) VALUES (?, ?, ?)",
    )
    .bind(student_id)
    .bind(assessment_id)
    .bind(submitted_at.to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(Error::from);

    if let Err(err) = inserted {
        if err.is_unique_violation() {
            return Err(duplicate_submission(student_id, assessment_id));
        }
        return Err(err);
    }

    for response in responses {
        sqlx::query(
            r#"
            INSERT INTO responses (
                response_id, student_id, assessment_id, question_id,
                response_text, is_correct, processed, submitted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(response.response_id.to_string())
        .bind(&response.student_id)
        .bind(&response.assessment_id)
        .bind(&response.question_id)
        .bind(&response.response_text)
        .bind(response.is_correct)
        .bind(response.processed)
        .bind(response.submitted_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub fn duplicate_submission(student_id: &str, assessment_id: &str) -> Error {
    Error::Conflict(format!(
        "Student {} has already submitted assessment {}",
        student_id, assessment_id
    ))
}

/// Every incorrect response of one assessment in seed order
///
/// Processed responses are included: a question with new responses is
/// re-clustered over its whole incorrect set.
pub async fn load_incorrect(
    pool: &SqlitePool,
    assessment_id: &str,
    order: SeedOrder,
) -> Result<Vec<StudentResponse>> {
    let order_by = match order {
        SeedOrder::Submission => "submitted_at, rowid",
        SeedOrder::Arrival => "rowid",
    };

    let sql = format!(
        r#"
        SELECT response_id, student_id, assessment_id, question_id,
               response_text, is_correct, processed, submitted_at
        FROM responses
        WHERE assessment_id = ? AND is_correct = 0
        ORDER BY {}
        "#,
        order_by
    );

    let rows = sqlx::query(&sql).bind(assessment_id).fetch_all(pool).await?;

    rows.iter()
        .map(|row| {
            let response_id: String = row.get("response_id");
            let submitted_at: String = row.get("submitted_at");
            Ok(StudentResponse {
                response_id: parse_uuid(&response_id, "response_id")?,
                student_id: row.get("student_id"),
                assessment_id: row.get("assessment_id"),
                question_id: row.get("question_id"),
                response_text: row.get("response_text"),
                is_correct: row.get("is_correct"),
                processed: row.get("processed"),
                submitted_at: parse_timestamp(&submitted_at, "submitted_at")?,
            })
        })
        .collect()
}

/// Flag responses as incorporated into an analysis run
pub async fn mark_processed(pool: &SqlitePool, response_ids: &[Uuid]) -> Result<u64> {
    let mut updated = 0;

    for chunk in response_ids.chunks(IN_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE responses SET processed = 1 WHERE response_id IN (");
        let mut ids = qb.separated(", ");
        for id in chunk {
            ids.push_bind(id.to_string());
        }
        ids.push_unseparated(")");

        updated += qb.build().execute(pool).await?.rows_affected();
    }

    Ok(updated)
}

/// Response texts by id; unknown ids are absent from the map
pub async fn load_response_texts(
    pool: &SqlitePool,
    response_ids: &[Uuid],
) -> Result<HashMap<Uuid, String>> {
    let mut texts = HashMap::with_capacity(response_ids.len());

    for chunk in response_ids.chunks(IN_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT response_id, response_text FROM responses WHERE response_id IN (");
        let mut ids = qb.separated(", ");
        for id in chunk {
            ids.push_bind(id.to_string());
        }
        ids.push_unseparated(")");

        for row in qb.build().fetch_all(pool).await? {
            let id: String = row.get("response_id");
            texts.insert(parse_uuid(&id, "response_id")?, row.get("response_text"));
        }
    }

    Ok(texts)
}

/// Number of students who submitted the assessment
pub async fn count_attempts(pool: &SqlitePool, assessment_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE assessment_id = ?")
        .bind(assessment_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Number of responses across all assessments owned by an instructor
pub async fn count_instructor_responses(pool: &SqlitePool, instructor_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM responses r
        JOIN assessments a ON a.assessment_id = r.assessment_id
        WHERE a.instructor_id = ?
        "#,
    )
    .bind(instructor_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Response and student totals for one assessment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseTotals {
    pub students: i64,
    pub responses: i64,
    pub correct: i64,
}

pub async fn response_totals(pool: &SqlitePool, assessment_id: &str) -> Result<ResponseTotals> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(DISTINCT student_id) AS students,
               COUNT(*) AS responses,
               COALESCE(SUM(is_correct), 0) AS correct
        FROM responses
        WHERE assessment_id = ?
        "#,
    )
    .bind(assessment_id)
    .fetch_one(pool)
    .await?;

    Ok(ResponseTotals {
        students: row.get("students"),
        responses: row.get("responses"),
        correct: row.get("correct"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use conceptlens_common::db::init_memory_database;

    fn response(student: &str, question: &str, text: &str, offset_secs: i64) -> StudentResponse {
        StudentResponse {
            response_id: Uuid::new_v4(),
            student_id: student.to_string(),
            assessment_id: "a1".to_string(),
            question_id: question.to_string(),
            response_text: text.to_string(),
            is_correct: false,
            processed: false,
            submitted_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn test_second_submission_conflicts_and_writes_nothing() {
        let pool = init_memory_database().await.unwrap();
        let first = vec![response("s1", "q1", "wrong", 0)];
        store_submission(&pool, "s1", "a1", Utc::now(), &first).await.unwrap();

        let second = vec![response("s1", "q1", "other", 0)];
        let err = store_submission(&pool, "s1", "a1", Utc::now(), &second)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
        assert!(submission_exists(&pool, "s1", "a1").await.unwrap());
        let stored = load_incorrect(&pool, "a1", SeedOrder::Arrival).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].response_text, "wrong");
    }

    #[tokio::test]
    async fn test_incorrect_excludes_correct_but_keeps_processed() {
        let pool = init_memory_database().await.unwrap();
        let mut correct = response("s1", "q1", "right", 0);
        correct.is_correct = true;
        let wrong = response("s1", "q2", "wrong", 0);
        let wrong_id = wrong.response_id;
        let later = response("s1", "q3", "also wrong", 0);
        store_submission(&pool, "s1", "a1", Utc::now(), &[correct, wrong, later])
            .await
            .unwrap();

        assert_eq!(mark_processed(&pool, &[wrong_id]).await.unwrap(), 1);

        let incorrect = load_incorrect(&pool, "a1", SeedOrder::Submission).await.unwrap();
        assert_eq!(incorrect.len(), 2);
        assert_eq!(incorrect[0].question_id, "q2");
        assert!(incorrect[0].processed);
        assert_eq!(incorrect[1].question_id, "q3");
        assert!(!incorrect[1].processed);
    }

    #[tokio::test]
    async fn test_submission_order_sorts_by_timestamp() {
        let pool = init_memory_database().await.unwrap();
        let late = response("s1", "q1", "late", 60);
        let early = response("s2", "q1", "early", 0);
        store_submission(&pool, "s1", "a1", Utc::now(), &[late]).await.unwrap();
        store_submission(&pool, "s2", "a1", Utc::now(), &[early]).await.unwrap();

        let by_time = load_incorrect(&pool, "a1", SeedOrder::Submission).await.unwrap();
        assert_eq!(by_time[0].response_text, "early");

        let by_arrival = load_incorrect(&pool, "a1", SeedOrder::Arrival).await.unwrap();
        assert_eq!(by_arrival[0].response_text, "late");
    }

    #[tokio::test]
    async fn test_response_texts_and_attempts() {
        let pool = init_memory_database().await.unwrap();
        let r = response("s1", "q1", "text one", 0);
        let id = r.response_id;
        store_submission(&pool, "s1", "a1", Utc::now(), &[r]).await.unwrap();

        let texts = load_response_texts(&pool, &[id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[&id], "text one");
        assert_eq!(count_attempts(&pool, "a1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_response_totals_count_distinct_students() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(response_totals(&pool, "a1").await.unwrap(), ResponseTotals::default());

        let mut right = response("s1", "q1", "4", 0);
        right.is_correct = true;
        let wrong = response("s1", "q2", "no", 0);
        store_submission(&pool, "s1", "a1", Utc::now(), &[right, wrong]).await.unwrap();
        store_submission(&pool, "s2", "a1", Utc::now(), &[response("s2", "q1", "5", 0)])
            .await
            .unwrap();

        let totals = response_totals(&pool, "a1").await.unwrap();
        assert_eq!(totals.students, 2);
        assert_eq!(totals.responses, 3);
        assert_eq!(totals.correct, 1);
    }
}
