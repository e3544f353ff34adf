//! Triage audit trail

use conceptlens_common::models::AuditEntry;
use conceptlens_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};

/// Append one audit row on an open connection or transaction
pub async fn insert_entry(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO triage_audit (audit_id, misconception_id, actor, action, new_label, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.audit_id.to_string())
    .bind(entry.misconception_id.to_string())
    .bind(&entry.actor)
    .bind(&entry.action)
    .bind(&entry.new_label)
    .bind(entry.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Audit trail of one misconception, oldest first
pub async fn list_entries(pool: &SqlitePool, misconception_id: Uuid) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT audit_id, misconception_id, actor, action, new_label, created_at
        FROM triage_audit
        WHERE misconception_id = ?
        ORDER BY created_at, rowid
        "#,
    )
    .bind(misconception_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let audit_id: String = row.get("audit_id");
            let misconception_id: String = row.get("misconception_id");
            let created_at: String = row.get("created_at");
            Ok(AuditEntry {
                audit_id: parse_uuid(&audit_id, "audit_id")?,
                misconception_id: parse_uuid(&misconception_id, "misconception_id")?,
                actor: row.get("actor"),
                action: row.get("action"),
                new_label: row.get("new_label"),
                created_at: parse_timestamp(&created_at, "created_at")?,
            })
        })
        .collect()
}
