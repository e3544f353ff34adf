//! One analysis run: group → cluster → store
//!
//! Every question with unprocessed incorrect responses is re-clustered over
//! its whole incorrect set, so answers arriving in separate submissions
//! aggregate into one record. Each group is clustered on the blocking pool.
//! A group whose clustering panics or whose writes fail is reported as
//! `QuestionClusteringFailed` and left unprocessed; the other groups carry on.

use anyhow::Context;
use chrono::Utc;
use conceptlens_common::events::{AnalysisEvent, EventBus};
use conceptlens_common::models::NewMisconception;
use conceptlens_common::Error;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::clustering::cluster_responses;
use super::grouper::{load_question_groups, QuestionGroup};
use crate::config::{AnalysisSettings, ClusteringConfig};
use crate::db::misconceptions::{self, UpsertOutcome};
use crate::db::responses;
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Counters reported when a run completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisOutcome {
    /// Incorrect responses clustered, earlier ones included
    pub responses_analyzed: usize,
    /// Responses seen for the first time by this run
    pub responses_new: usize,
    pub questions_analyzed: usize,
    pub questions_failed: usize,
    pub misconceptions_created: usize,
    /// Pending records whose count, label or examples moved
    pub misconceptions_refreshed: usize,
    /// Records already current, triaged, or blocked by a renamed label
    pub misconceptions_unchanged: usize,
}

#[derive(Debug, Default)]
struct GroupTally {
    created: usize,
    refreshed: usize,
    unchanged: usize,
}

/// Run grouping and clustering for one assessment
///
/// Errors only when the responses cannot be loaded.
pub async fn run_analysis(
    pool: &SqlitePool,
    events: &EventBus,
    assessment_id: &str,
    config: &ClusteringConfig,
    settings: &AnalysisSettings,
) -> anyhow::Result<AnalysisOutcome> {
    let groups = load_question_groups(pool, assessment_id, config.seed_order)
        .await
        .with_context(|| format!("Failed to load responses for {}", assessment_id))?;

    let mut outcome = AnalysisOutcome::default();

    for group in groups {
        let question_id = group.question_id.clone();
        let group_size = group.responses.len();
        let pending_ids = group.pending_ids();

        let result = match cluster_group(assessment_id, group, *config).await {
            Ok(candidates) => store_group(pool, &candidates, &pending_ids, settings).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(tally) => {
                outcome.responses_analyzed += group_size;
                outcome.responses_new += pending_ids.len();
                outcome.questions_analyzed += 1;
                outcome.misconceptions_created += tally.created;
                outcome.misconceptions_refreshed += tally.refreshed;
                outcome.misconceptions_unchanged += tally.unchanged;
            }
            Err(e) => {
                tracing::warn!(
                    assessment_id,
                    question_id = %question_id,
                    error = %format!("{:#}", e),
                    "Question clustering failed"
                );
                outcome.questions_failed += 1;
                events.emit_lossy(AnalysisEvent::QuestionClusteringFailed {
                    assessment_id: assessment_id.to_string(),
                    question_id,
                    error: format!("{:#}", e),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    Ok(outcome)
}

async fn cluster_group(
    assessment_id: &str,
    group: QuestionGroup,
    config: ClusteringConfig,
) -> anyhow::Result<Vec<NewMisconception>> {
    let assessment_id = assessment_id.to_string();

    tokio::task::spawn_blocking(move || {
        cluster_responses(&assessment_id, &group.question_id, &group.responses, &config)
    })
    .await
    .context("Clustering task aborted")
}

/// Upsert every candidate, then mark the group's new responses processed
///
/// Responses that arrive while the group is being stored are not in
/// `pending_ids` and trigger the next run.
async fn store_group(
    pool: &SqlitePool,
    candidates: &[NewMisconception],
    pending_ids: &[Uuid],
    settings: &AnalysisSettings,
) -> anyhow::Result<GroupTally> {
    let now = Utc::now();
    let mut tally = GroupTally::default();

    for candidate in candidates {
        let stored = retry_on_lock("upsert misconception", DEFAULT_MAX_LOCK_WAIT_MS, || {
            misconceptions::upsert_cluster(pool, candidate, now)
        })
        .await;

        match stored {
            Ok(UpsertOutcome::Created(record)) => {
                tracing::debug!(
                    misconception_id = %record.misconception_id,
                    label = %record.cluster_label,
                    student_count = record.student_count,
                    "Stored misconception"
                );
                tally.created += 1;
            }
            Ok(UpsertOutcome::Refreshed(record)) => {
                tracing::debug!(
                    misconception_id = %record.misconception_id,
                    label = %record.cluster_label,
                    student_count = record.student_count,
                    "Refreshed misconception"
                );
                tally.refreshed += 1;
            }
            Ok(UpsertOutcome::Unchanged(_)) => tally.unchanged += 1,
            Err(Error::Conflict(message)) => {
                tracing::warn!(key = %candidate.cluster_key, "{}", message);
                tally.unchanged += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to store '{}'", candidate.cluster_label))
            }
        }
    }

    if settings.mark_processed {
        retry_on_lock("mark responses processed", DEFAULT_MAX_LOCK_WAIT_MS, || {
            responses::mark_processed(pool, pending_ids)
        })
        .await
        .context("Failed to mark responses processed")?;
    }

    Ok(tally)
}
