//! Instructor triage of detected misconceptions
//!
//! Status moves pending → valid (approve, rename) or pending → rejected.
//! Transitions are not restricted beyond that: approving a valid record is a
//! no-op change that is still audited. Priority is a separate flag.
//!
//! Validation order: id format, action name, rename label, existence,
//! ownership. Nothing is written unless all pass.

use chrono::Utc;
use conceptlens_common::models::{AuditEntry, Misconception, MisconceptionStatus};
use conceptlens_common::{Error, Result};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::misconceptions::{self, MisconceptionUpdate};
use crate::db::assessments;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageAction {
    Approve,
    Reject,
    Rename,
    Prioritize,
    Deprioritize,
}

impl TriageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageAction::Approve => "approve",
            TriageAction::Reject => "reject",
            TriageAction::Rename => "rename",
            TriageAction::Prioritize => "prioritize",
            TriageAction::Deprioritize => "deprioritize",
        }
    }
}

impl fmt::Display for TriageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(TriageAction::Approve),
            "reject" => Ok(TriageAction::Reject),
            "rename" => Ok(TriageAction::Rename),
            "prioritize" => Ok(TriageAction::Prioritize),
            "deprioritize" => Ok(TriageAction::Deprioritize),
            other => Err(Error::InvalidInput(format!(
                "Invalid action '{}' (expected approve, reject, rename, prioritize or deprioritize)",
                other
            ))),
        }
    }
}

/// Field changes for an action; `new_label` must already be validated
fn update_for(action: TriageAction, new_label: Option<String>) -> MisconceptionUpdate {
    match action {
        TriageAction::Approve => MisconceptionUpdate {
            status: Some(MisconceptionStatus::Valid),
            ..Default::default()
        },
        TriageAction::Reject => MisconceptionUpdate {
            status: Some(MisconceptionStatus::Rejected),
            ..Default::default()
        },
        TriageAction::Rename => MisconceptionUpdate {
            status: Some(MisconceptionStatus::Valid),
            cluster_label: new_label,
            ..Default::default()
        },
        TriageAction::Prioritize => MisconceptionUpdate {
            is_priority: Some(true),
            ..Default::default()
        },
        TriageAction::Deprioritize => MisconceptionUpdate {
            is_priority: Some(false),
            ..Default::default()
        },
    }
}

/// Parse a misconception id from a path segment
pub fn parse_misconception_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| Error::InvalidInput(format!("Invalid misconception id '{}'", raw)))
}

/// Load a misconception the instructor is allowed to see
///
/// NotFound when the record or its assessment is unknown, Forbidden when the
/// assessment belongs to someone else.
pub async fn load_owned(
    pool: &SqlitePool,
    misconception_id: Uuid,
    instructor_id: &str,
) -> Result<Misconception> {
    let misconception = misconceptions::load_misconception(pool, misconception_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Misconception {} not found", misconception_id)))?;

    let owner = assessments::assessment_owner(pool, &misconception.assessment_id)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!("Assessment {} not found", misconception.assessment_id))
        })?;

    if owner != instructor_id {
        return Err(Error::Forbidden(format!(
            "Misconception {} belongs to another instructor's assessment",
            misconception_id
        )));
    }

    Ok(misconception)
}

/// Apply one triage action on behalf of `instructor_id`
pub async fn apply_triage(
    pool: &SqlitePool,
    raw_id: &str,
    raw_action: &str,
    new_label: Option<&str>,
    instructor_id: &str,
) -> Result<Misconception> {
    let misconception_id = parse_misconception_id(raw_id)?;
    let action: TriageAction = raw_action.parse()?;

    let new_label = match action {
        TriageAction::Rename => {
            let label = new_label.map(str::trim).unwrap_or_default();
            if label.is_empty() {
                return Err(Error::InvalidInput(
                    "Rename requires a non-empty new_label".to_string(),
                ));
            }
            Some(label.to_string())
        }
        _ => None,
    };

    load_owned(pool, misconception_id, instructor_id).await?;

    let entry = AuditEntry {
        audit_id: Uuid::new_v4(),
        misconception_id,
        actor: instructor_id.to_string(),
        action: action.as_str().to_string(),
        new_label: new_label.clone(),
        created_at: Utc::now(),
    };

    let updated =
        misconceptions::apply_update(pool, misconception_id, &update_for(action, new_label), &entry)
            .await?;

    tracing::info!(
        misconception_id = %misconception_id,
        action = %action,
        actor = instructor_id,
        status = %updated.status,
        is_priority = updated.is_priority,
        "Triage applied"
    );

    Ok(updated)
}
