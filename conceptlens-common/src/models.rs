//! Domain models shared by the ingestion, analysis and reporting paths

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum number of example response ids kept on a misconception
pub const MAX_EXAMPLE_IDS: usize = 5;

/// One learner answer as submitted, before grading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedResponse {
    pub student_id: String,
    pub assessment_id: String,
    pub question_id: String,
    pub response_text: String,
    /// Defaults to ingestion time when the client omits it
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Graded, persisted learner answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResponse {
    pub response_id: Uuid,
    pub student_id: String,
    pub assessment_id: String,
    pub question_id: String,
    pub response_text: String,
    pub is_correct: bool,
    pub processed: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Validation lifecycle of a detected misconception
///
/// `Pending` is the initial state. `Valid` and `Rejected` are reached through
/// triage; priority is tracked separately and is not part of this lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MisconceptionStatus {
    Pending,
    Valid,
    Rejected,
}

impl MisconceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MisconceptionStatus::Pending => "pending",
            MisconceptionStatus::Valid => "valid",
            MisconceptionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for MisconceptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MisconceptionStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MisconceptionStatus::Pending),
            "valid" => Ok(MisconceptionStatus::Valid),
            "rejected" => Ok(MisconceptionStatus::Rejected),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown misconception status: {}",
                other
            ))),
        }
    }
}

/// Cluster candidate produced by the clustering engine, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMisconception {
    pub assessment_id: String,
    pub question_id: String,
    /// Normalised seed text; stable while the cluster grows
    pub cluster_key: String,
    pub cluster_label: String,
    pub student_count: u32,
    pub confidence_score: f64,
    pub example_ids: Vec<Uuid>,
}

/// Persisted misconception record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Misconception {
    pub misconception_id: Uuid,
    pub assessment_id: String,
    pub question_id: String,
    #[serde(default)]
    pub cluster_key: String,
    pub cluster_label: String,
    /// Cluster size as of the latest run; frozen once triaged
    pub student_count: u32,
    pub confidence_score: f64,
    pub example_ids: Vec<Uuid>,
    pub status: MisconceptionStatus,
    pub is_priority: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Misconception {
    /// (assessment, question, seed key) triple identifying "the same" misconception
    ///
    /// Unaffected by renames and by the label switching from the single to
    /// the group form as the cluster grows.
    pub fn signature(&self) -> (&str, &str, &str) {
        (&self.assessment_id, &self.question_id, &self.cluster_key)
    }
}

/// Question bank entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub text: String,
    pub correct_answer: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Assessment with its ordered question bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub assessment_id: String,
    pub instructor_id: String,
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

impl Assessment {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    /// Zero-based position of a question within the assessment
    pub fn question_position(&self, question_id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.question_id == question_id)
    }
}

/// One triage audit trail row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: Uuid,
    pub misconception_id: Uuid,
    pub actor: String,
    pub action: String,
    pub new_label: Option<String>,
    pub created_at: DateTime<Utc>,
}
