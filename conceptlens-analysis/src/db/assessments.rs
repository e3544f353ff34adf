//! Question bank persistence

use conceptlens_common::models::{Assessment, Question};
use conceptlens_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use super::parse_timestamp;

/// Insert or replace an assessment and its question list
///
/// The question list is replaced atomically. The owning instructor and the
/// creation time of an existing assessment are preserved.
pub async fn register_assessment(pool: &SqlitePool, assessment: &Assessment) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO assessments (assessment_id, instructor_id, title, subject, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(assessment_id) DO UPDATE SET
            title = excluded.title,
            subject = excluded.subject
        "#,
    )
    .bind(&assessment.assessment_id)
    .bind(&assessment.instructor_id)
    .bind(&assessment.title)
    .bind(&assessment.subject)
    .bind(assessment.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM questions WHERE assessment_id = ?")
        .bind(&assessment.assessment_id)
        .execute(&mut *tx)
        .await?;

    for (position, question) in assessment.questions.iter().enumerate() {
        let options = serde_json::to_string(&question.options)
            .map_err(|e| Error::Internal(format!("Failed to serialize options: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO questions (assessment_id, question_id, position, text, correct_answer, options)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&assessment.assessment_id)
        .bind(&question.question_id)
        .bind(position as i64)
        .bind(&question.text)
        .bind(&question.correct_answer)
        .bind(options)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::debug!(
        assessment_id = %assessment.assessment_id,
        questions = assessment.questions.len(),
        "Registered assessment"
    );

    Ok(())
}

/// Owning instructor of an assessment, if it exists
pub async fn assessment_owner(pool: &SqlitePool, assessment_id: &str) -> Result<Option<String>> {
    let owner: Option<String> =
        sqlx::query_scalar("SELECT instructor_id FROM assessments WHERE assessment_id = ?")
            .bind(assessment_id)
            .fetch_optional(pool)
            .await?;

    Ok(owner)
}

/// Load an assessment with its questions in position order
pub async fn load_assessment(pool: &SqlitePool, assessment_id: &str) -> Result<Option<Assessment>> {
    let row = sqlx::query(
        r#"
        SELECT assessment_id, instructor_id, title, subject, created_at
        FROM assessments
        WHERE assessment_id = ?
        "#,
    )
    .bind(assessment_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let question_rows = sqlx::query(
        r#"
        SELECT question_id, text, correct_answer, options
        FROM questions
        WHERE assessment_id = ?
        ORDER BY position
        "#,
    )
    .bind(assessment_id)
    .fetch_all(pool)
    .await?;

    let mut questions = Vec::with_capacity(question_rows.len());
    for q in question_rows {
        let options: String = q.get("options");
        let options: Vec<String> = serde_json::from_str(&options)
            .map_err(|e| Error::Internal(format!("Failed to deserialize options: {}", e)))?;

        questions.push(Question {
            question_id: q.get("question_id"),
            text: q.get("text"),
            correct_answer: q.get("correct_answer"),
            options,
        });
    }

    let created_at: String = row.get("created_at");

    Ok(Some(Assessment {
        assessment_id: row.get("assessment_id"),
        instructor_id: row.get("instructor_id"),
        title: row.get("title"),
        subject: row.get("subject"),
        questions,
        created_at: parse_timestamp(&created_at, "created_at")?,
    }))
}

/// All assessments owned by an instructor, oldest first
pub async fn list_instructor_assessments(
    pool: &SqlitePool,
    instructor_id: &str,
) -> Result<Vec<Assessment>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT assessment_id FROM assessments
        WHERE instructor_id = ?
        ORDER BY created_at, assessment_id
        "#,
    )
    .bind(instructor_id)
    .fetch_all(pool)
    .await?;

    let mut assessments = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(assessment) = load_assessment(pool, &id).await? {
            assessments.push(assessment);
        }
    }

    Ok(assessments)
}
