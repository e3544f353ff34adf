//! Misconception store
//!
//! Analysis runs upsert by (assessment_id, question_id, cluster_key). A
//! pending record follows its cluster as it grows; once triaged it is never
//! rewritten by a run.

use chrono::{DateTime, Utc};
use conceptlens_common::models::{
    AuditEntry, Misconception, MisconceptionStatus, NewMisconception, MAX_EXAMPLE_IDS,
};
use conceptlens_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{audit, parse_timestamp, parse_uuid};

const SELECT_COLUMNS: &str = r#"
    SELECT m.misconception_id, m.assessment_id, m.question_id, m.cluster_key, m.cluster_label,
           m.student_count, m.confidence_score, m.example_ids, m.status,
           m.is_priority, m.created_at, m.last_updated
    FROM misconceptions m
"#;

/// Read filter for [`list_misconceptions`]
#[derive(Debug, Clone, Default)]
pub struct MisconceptionFilter {
    pub status: Option<MisconceptionStatus>,
    pub assessment_id: Option<String>,
    /// Restrict to assessments owned by this instructor
    pub instructor_id: Option<String>,
}

/// Field changes applied by one triage action; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MisconceptionUpdate {
    pub status: Option<MisconceptionStatus>,
    pub cluster_label: Option<String>,
    pub is_priority: Option<bool>,
}

/// Per-status record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub valid: i64,
    pub rejected: i64,
}

/// What [`upsert_cluster`] did with one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No record had this seed key yet
    Created(Misconception),
    /// A pending record took the candidate's count, label and examples
    Refreshed(Misconception),
    /// Already current, or triaged and therefore left alone
    Unchanged(Misconception),
}

/// Store a cluster candidate under its seed key
///
/// A label already used by another record of the question (typically a
/// rename) is a `Conflict`.
pub async fn upsert_cluster(
    pool: &SqlitePool,
    candidate: &NewMisconception,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let example_ids: Vec<Uuid> = candidate.example_ids.iter().take(MAX_EXAMPLE_IDS).copied().collect();
    let example_json = serde_json::to_string(&example_ids)
        .map_err(|e| Error::Internal(format!("Failed to serialize example ids: {}", e)))?;

    let mut tx = pool.begin().await?;

    let sql = format!(
        "{} WHERE m.assessment_id = ? AND m.question_id = ? AND m.cluster_key = ?",
        SELECT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(&candidate.assessment_id)
        .bind(&candidate.question_id)
        .bind(&candidate.cluster_key)
        .fetch_optional(&mut *tx)
        .await?;
    let existing = row.as_ref().map(row_to_misconception).transpose()?;

    let outcome = match existing {
        None => {
            let misconception = Misconception {
                misconception_id: Uuid::new_v4(),
                assessment_id: candidate.assessment_id.clone(),
                question_id: candidate.question_id.clone(),
                cluster_key: candidate.cluster_key.clone(),
                cluster_label: candidate.cluster_label.clone(),
                student_count: candidate.student_count,
                confidence_score: candidate.confidence_score,
                example_ids,
                status: MisconceptionStatus::Pending,
                is_priority: false,
                created_at: now,
                last_updated: now,
            };

            sqlx::query(
                r#"
                INSERT INTO misconceptions (
                    misconception_id, assessment_id, question_id, cluster_key, cluster_label,
                    student_count, confidence_score, example_ids, status,
                    is_priority, created_at, last_updated
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(misconception.misconception_id.to_string())
            .bind(&misconception.assessment_id)
            .bind(&misconception.question_id)
            .bind(&misconception.cluster_key)
            .bind(&misconception.cluster_label)
            .bind(misconception.student_count as i64)
            .bind(misconception.confidence_score)
            .bind(&example_json)
            .bind(misconception.status.as_str())
            .bind(misconception.is_priority)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| label_conflict(e.into(), &candidate.cluster_label))?;

            UpsertOutcome::Created(misconception)
        }
        Some(current) if current.status != MisconceptionStatus::Pending => {
            UpsertOutcome::Unchanged(current)
        }
        Some(current)
            if current.student_count == candidate.student_count
                && current.cluster_label == candidate.cluster_label
                && current.example_ids == example_ids
                && (current.confidence_score - candidate.confidence_score).abs() < 1e-9 =>
        {
            UpsertOutcome::Unchanged(current)
        }
        Some(mut current) => {
            sqlx::query(
                r#"
                UPDATE misconceptions SET
                    cluster_label = ?,
                    student_count = ?,
                    confidence_score = ?,
                    example_ids = ?,
                    last_updated = ?
                WHERE misconception_id = ?
                "#,
            )
            .bind(&candidate.cluster_label)
            .bind(candidate.student_count as i64)
            .bind(candidate.confidence_score)
            .bind(&example_json)
            .bind(now.to_rfc3339())
            .bind(current.misconception_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| label_conflict(e.into(), &candidate.cluster_label))?;

            current.cluster_label = candidate.cluster_label.clone();
            current.student_count = candidate.student_count;
            current.confidence_score = candidate.confidence_score;
            current.example_ids = example_ids;
            current.last_updated = now;
            UpsertOutcome::Refreshed(current)
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

fn label_conflict(err: Error, label: &str) -> Error {
    if err.is_unique_violation() {
        Error::Conflict(format!(
            "Another misconception for this question is already labelled '{}'",
            label
        ))
    } else {
        err
    }
}

pub async fn load_misconception(pool: &SqlitePool, misconception_id: Uuid) -> Result<Option<Misconception>> {
    let sql = format!("{} WHERE m.misconception_id = ?", SELECT_COLUMNS);

    let row = sqlx::query(&sql)
        .bind(misconception_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_misconception).transpose()
}

/// Misconceptions matching `filter` in creation order
pub async fn list_misconceptions(
    pool: &SqlitePool,
    filter: &MisconceptionFilter,
) -> Result<Vec<Misconception>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);

    if filter.instructor_id.is_some() {
        qb.push(" JOIN assessments a ON a.assessment_id = m.assessment_id");
    }
    qb.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
        qb.push(" AND m.status = ").push_bind(status.as_str());
    }
    if let Some(assessment_id) = &filter.assessment_id {
        qb.push(" AND m.assessment_id = ").push_bind(assessment_id.clone());
    }
    if let Some(instructor_id) = &filter.instructor_id {
        qb.push(" AND a.instructor_id = ").push_bind(instructor_id.clone());
    }
    qb.push(" ORDER BY m.created_at, m.rowid");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(row_to_misconception).collect()
}

/// Record counts per status for one instructor's assessments
pub async fn count_by_status(pool: &SqlitePool, instructor_id: &str) -> Result<StatusCounts> {
    let rows = sqlx::query(
        r#"
        SELECT m.status AS status, COUNT(*) AS total
        FROM misconceptions m
        JOIN assessments a ON a.assessment_id = m.assessment_id
        WHERE a.instructor_id = ?
        GROUP BY m.status
        "#,
    )
    .bind(instructor_id)
    .fetch_all(pool)
    .await?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let status: String = row.get("status");
        let total: i64 = row.get("total");
        match status.parse::<MisconceptionStatus>()? {
            MisconceptionStatus::Pending => counts.pending = total,
            MisconceptionStatus::Valid => counts.valid = total,
            MisconceptionStatus::Rejected => counts.rejected = total,
        }
    }

    Ok(counts)
}

/// Apply a triage update and its audit row in one transaction
///
/// A rename onto a label already used by another record of the same
/// question is a `Conflict`.
pub async fn apply_update(
    pool: &SqlitePool,
    misconception_id: Uuid,
    update: &MisconceptionUpdate,
    entry: &AuditEntry,
) -> Result<Misconception> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE misconceptions SET
            status = COALESCE(?, status),
            cluster_label = COALESCE(?, cluster_label),
            is_priority = COALESCE(?, is_priority),
            last_updated = ?
        WHERE misconception_id = ?
        "#,
    )
    .bind(update.status.map(|s| s.as_str()))
    .bind(update.cluster_label.as_deref())
    .bind(update.is_priority)
    .bind(entry.created_at.to_rfc3339())
    .bind(misconception_id.to_string())
    .execute(&mut *tx)
    .await
    .map_err(|e| label_conflict(e.into(), update.cluster_label.as_deref().unwrap_or_default()))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Misconception {} not found", misconception_id)));
    }

    audit::insert_entry(&mut *tx, entry).await?;
    tx.commit().await?;

    load_misconception(pool, misconception_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Misconception {} not found", misconception_id)))
}

fn row_to_misconception(row: &SqliteRow) -> Result<Misconception> {
    let misconception_id: String = row.get("misconception_id");
    let example_ids: String = row.get("example_ids");
    let example_ids: Vec<Uuid> = serde_json::from_str(&example_ids)
        .map_err(|e| Error::Internal(format!("Failed to deserialize example ids: {}", e)))?;
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let last_updated: String = row.get("last_updated");

    Ok(Misconception {
        misconception_id: parse_uuid(&misconception_id, "misconception_id")?,
        assessment_id: row.get("assessment_id"),
        question_id: row.get("question_id"),
        cluster_key: row.get("cluster_key"),
        cluster_label: row.get("cluster_label"),
        student_count: row.get::<i64, _>("student_count") as u32,
        confidence_score: row.get("confidence_score"),
        example_ids,
        status: status.parse()?,
        is_priority: row.get("is_priority"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        last_updated: parse_timestamp(&last_updated, "last_updated")?,
    })
}
