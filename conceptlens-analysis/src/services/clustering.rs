//! Greedy seed clustering of one question's incorrect responses
//!
//! The first unassigned response becomes the seed; every other unassigned
//! response joins when its similarity to the seed (not to other members)
//! reaches the threshold. Membership is therefore not transitive, and the
//! result depends on input order: callers choose it via
//! [`SeedOrder`](conceptlens_common::config::SeedOrder).

use conceptlens_common::models::{NewMisconception, StudentResponse, MAX_EXAMPLE_IDS};

use super::similarity::{normalize, similarity};
use crate::config::ClusteringConfig;

const SINGLE_LABEL_PREFIX: &str = "Potential misconception: '";
const GROUP_LABEL_PREFIX: &str = "Misconception similar to: '";

/// Label for a cluster seeded by `seed_text`
pub fn cluster_label(seed_text: &str, cluster_size: usize) -> String {
    if cluster_size == 1 {
        format!("{}{}'", SINGLE_LABEL_PREFIX, seed_text)
    } else {
        format!("{}{}'", GROUP_LABEL_PREFIX, seed_text)
    }
}

/// Text between the first and last single quote of a generated label
///
/// `None` when the label carries no quoted answer, e.g. after a rename.
pub fn quoted_answer(label: &str) -> Option<&str> {
    let start = label.find('\'')?;
    let end = label.rfind('\'')?;
    (end > start).then(|| &label[start + 1..end])
}

/// Cluster one question's responses
///
/// `responses` must all belong to `question_id`, in seed order. Clusters
/// smaller than `config.min_cluster_size` are dropped; their members are not
/// offered to later seeds.
pub fn cluster_responses(
    assessment_id: &str,
    question_id: &str,
    responses: &[StudentResponse],
    config: &ClusteringConfig,
) -> Vec<NewMisconception> {
    let mut unassigned: Vec<(&StudentResponse, String)> = responses
        .iter()
        .map(|r| (r, normalize(&r.response_text)))
        .collect();
    let mut clusters = Vec::new();

    while !unassigned.is_empty() {
        let (seed, seed_text) = unassigned.remove(0);
        let mut members = vec![seed];
        let mut remaining = Vec::with_capacity(unassigned.len());

        for (candidate, text) in unassigned {
            let score = similarity(config.metric, &seed_text, &text);
            tracing::trace!(
                seed = %seed.response_id,
                candidate = %candidate.response_id,
                score,
                "Similarity to seed"
            );
            if score >= config.similarity_threshold {
                members.push(candidate);
            } else {
                remaining.push((candidate, text));
            }
        }
        unassigned = remaining;

        if members.len() < config.min_cluster_size {
            continue;
        }

        clusters.push(NewMisconception {
            assessment_id: assessment_id.to_string(),
            question_id: question_id.to_string(),
            cluster_label: cluster_label(seed.response_text.trim(), members.len()),
            cluster_key: seed_text,
            student_count: members.len() as u32,
            confidence_score: config.scoring.score(members.len()),
            example_ids: members
                .iter()
                .take(MAX_EXAMPLE_IDS)
                .map(|r| r.response_id)
                .collect(),
        });
    }

    tracing::debug!(
        assessment_id,
        question_id,
        responses = responses.len(),
        clusters = clusters.len(),
        "Clustered question responses"
    );

    clusters
}
