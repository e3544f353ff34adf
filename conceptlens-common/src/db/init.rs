//! Database initialization
//!
//! Opens (or creates) the SQLite database and applies the schema. Every
//! statement is idempotent so startup can run it unconditionally.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Open the database at `db_path`, creating file and tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Connection options apply per connection, so pragmas hold for the whole pool
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// An in-memory SQLite database lives and dies with its connection, so the
/// pool is pinned to one connection that is never recycled.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_assessments_table(pool).await?;
    create_questions_table(pool).await?;
    create_submissions_table(pool).await?;
    create_responses_table(pool).await?;
    create_misconceptions_table(pool).await?;
    create_triage_audit_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Assessments and their owning instructor (question bank header)
async fn create_assessments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessments (
            assessment_id TEXT PRIMARY KEY,
            instructor_id TEXT NOT NULL,
            title TEXT NOT NULL,
            subject TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assessments_instructor ON assessments(instructor_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ordered question bank entries
async fn create_questions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            assessment_id TEXT NOT NULL REFERENCES assessments(assessment_id) ON DELETE CASCADE,
            question_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            correct_answer TEXT NOT NULL,
            options TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (assessment_id, question_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per accepted (student, assessment) submission
async fn create_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            student_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            PRIMARY KEY (student_id, assessment_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Graded learner responses
///
/// No foreign key to `assessments`: responses for an unknown assessment are
/// accepted and graded incorrect.
async fn create_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            response_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            response_text TEXT NOT NULL,
            is_correct INTEGER NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            submitted_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_responses_pending
        ON responses(assessment_id, processed, is_correct)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Detected misconceptions
///
/// (assessment, question, cluster_key) is the canonical signature that runs
/// upsert against. Labels stay unique per question so a rename cannot
/// collide with another record.
async fn create_misconceptions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS misconceptions (
            misconception_id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            cluster_key TEXT NOT NULL,
            cluster_label TEXT NOT NULL,
            student_count INTEGER NOT NULL,
            confidence_score REAL NOT NULL,
            example_ids TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'pending',
            is_priority INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL,
            UNIQUE (assessment_id, question_id, cluster_key),
            UNIQUE (assessment_id, question_id, cluster_label)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_misconceptions_assessment_status
        ON misconceptions(assessment_id, status)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit trail of triage actions
async fn create_triage_audit_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS triage_audit (
            audit_id TEXT PRIMARY KEY,
            misconception_id TEXT NOT NULL REFERENCES misconceptions(misconception_id) ON DELETE CASCADE,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            new_label TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_triage_audit_misconception ON triage_audit(misconception_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
