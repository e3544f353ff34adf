//! Read-time misconception report
//!
//! Stored records are collapsed twice before display: by canonical signature
//! (assessment, question, seed key), then within an assessment by (question,
//! quoted wrong answer). Surviving records are enriched with question data,
//! topic, concept chain, evidence and an impact estimate.
//!
//! `performance_distribution` is randomly simulated, not measured. It is
//! tagged `kind: "simulated"` in every card.

use chrono::{DateTime, Utc};
use conceptlens_common::models::{Assessment, Misconception, MisconceptionStatus};
use conceptlens_common::{Error, Result};
use rand::Rng;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;

use super::clustering::quoted_answer;
use super::topics::{infer_topic, FALLBACK_TOPIC};
use crate::db::misconceptions::{list_misconceptions, MisconceptionFilter};
use crate::db::assessments;
use crate::db::responses::{self, ResponseTotals};

pub const SKIPPED_EVIDENCE: &str = "Skipped (No Response)";
const MAX_EVIDENCE: usize = 3;
const MAX_IMPACT: f64 = 5.0;
const QUESTIONS_PER_UNIT: usize = 5;
const UNKNOWN_QUESTION: &str = "Unknown Question";
const UNKNOWN_SUBJECT: &str = "Subject";

/// Status selection for a report; `valid` unless the caller asks otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Only(MisconceptionStatus),
    All,
}

impl Default for ReportStatus {
    fn default() -> Self {
        ReportStatus::Only(MisconceptionStatus::Valid)
    }
}

impl FromStr for ReportStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "all" => Ok(ReportStatus::All),
            other => other.parse().map(ReportStatus::Only),
        }
    }
}

impl ReportStatus {
    fn as_filter(&self) -> Option<MisconceptionStatus> {
        match self {
            ReportStatus::Only(status) => Some(*status),
            ReportStatus::All => None,
        }
    }
}

/// Simulated top/average/struggling split of a student count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceDistribution {
    /// Always "simulated"
    pub kind: &'static str,
    pub top: u32,
    pub average: u32,
    pub struggling: u32,
}

/// Split `count` using a top share of 15-30% and an average share of
/// 40-60%, rounding down; struggling takes the remainder
pub fn simulate_distribution<R: Rng>(count: u32, rng: &mut R) -> PerformanceDistribution {
    let top_pct: u32 = rng.gen_range(15..=30);
    let average_pct: u32 = rng.gen_range(40..=60);
    let top = (u64::from(count) * u64::from(top_pct) / 100) as u32;
    let average = (u64::from(count) * u64::from(average_pct) / 100) as u32;

    PerformanceDistribution {
        kind: "simulated",
        top,
        average,
        struggling: count - top - average,
    }
}

/// `min(5, count / max(1, attempts) * 10)` to one decimal
pub fn impact_estimate(student_count: u32, attempts: i64) -> f64 {
    let ratio = student_count as f64 / attempts.max(1) as f64;
    ((ratio * 10.0).min(MAX_IMPACT) * 10.0).round() / 10.0
}

/// Wrong answer shown on a card: the quoted part of a generated label
pub fn incorrect_answer(label: &str) -> String {
    match quoted_answer(label) {
        Some(answer) if answer.trim().is_empty() => "no answer".to_string(),
        Some(answer) => answer.to_string(),
        None => "an incorrect option".to_string(),
    }
}

/// Within-report dedup key
///
/// Labels without a quoted answer (renamed records) key on the whole label so
/// distinct renamed records are not merged with each other.
fn answer_key(question_id: &str, label: &str) -> (String, String) {
    let key = match quoted_answer(label) {
        Some(answer) => answer.trim().to_lowercase(),
        None => label.trim().to_lowercase(),
    };
    (question_id.to_string(), key)
}

/// Keep the first record of each canonical signature
pub fn dedup_by_signature(misconceptions: Vec<Misconception>) -> Vec<Misconception> {
    let mut seen = HashSet::new();
    misconceptions
        .into_iter()
        .filter(|m| {
            let (assessment_id, question_id, key) = m.signature();
            seen.insert((assessment_id.to_string(), question_id.to_string(), key.to_string()))
        })
        .collect()
}

/// Enriched misconception for display
#[derive(Debug, Clone, Serialize)]
pub struct MisconceptionCard {
    pub id: Uuid,
    pub assessment_id: String,
    pub question_id: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub cluster_label: String,
    pub incorrect_answer: String,
    pub student_count: u32,
    pub confidence_score: f64,
    pub status: MisconceptionStatus,
    pub is_priority: bool,
    pub topic: String,
    pub reasoning: String,
    /// [subject, "Unit N", topic]
    pub concept_chain: Vec<String>,
    pub evidence: Vec<String>,
    pub future_score_impact: f64,
    pub performance_distribution: PerformanceDistribution,
}

/// One assessment's section of the report
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub assessment_id: String,
    pub title: String,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
    pub misconception_count: usize,
    /// Students who submitted the assessment
    pub student_count: i64,
    pub impact_summary: String,
    pub misconceptions: Vec<MisconceptionCard>,
}

/// Build one card; an unresolvable question degrades to placeholder text
pub fn build_card<R: Rng>(
    misconception: &Misconception,
    assessment: Option<&Assessment>,
    response_texts: &HashMap<Uuid, String>,
    attempts: i64,
    rng: &mut R,
) -> MisconceptionCard {
    let question = assessment.and_then(|a| a.question(&misconception.question_id));
    let position = assessment.and_then(|a| a.question_position(&misconception.question_id));

    let topic = question
        .map(|q| infer_topic(&q.text))
        .unwrap_or(FALLBACK_TOPIC)
        .to_string();
    let subject = assessment
        .and_then(|a| a.subject.clone())
        .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
    let unit = format!("Unit {}", position.unwrap_or(0) / QUESTIONS_PER_UNIT + 1);

    let answer = incorrect_answer(&misconception.cluster_label);
    let reasoning = format!(
        "**Analysis:** {} students consistently chose '{}', indicating a specific gap in understanding. \
         **Recommendation:** Review the distinction between the correct concept and '{}' with examples focusing on edge cases.",
        misconception.student_count, answer, answer
    );

    let mut evidence: Vec<String> = misconception
        .example_ids
        .iter()
        .filter_map(|id| response_texts.get(id))
        .map(|text| {
            if text.trim().is_empty() {
                SKIPPED_EVIDENCE.to_string()
            } else {
                text.clone()
            }
        })
        .take(MAX_EVIDENCE)
        .collect();
    if evidence.is_empty() {
        let placeholders = (misconception.student_count as usize).min(MAX_EVIDENCE);
        evidence = vec![SKIPPED_EVIDENCE.to_string(); placeholders];
    }

    MisconceptionCard {
        id: misconception.misconception_id,
        assessment_id: misconception.assessment_id.clone(),
        question_id: misconception.question_id.clone(),
        question_text: question
            .map(|q| q.text.clone())
            .unwrap_or_else(|| UNKNOWN_QUESTION.to_string()),
        options: question.map(|q| q.options.clone()).unwrap_or_default(),
        correct_answer: question.map(|q| q.correct_answer.clone()).unwrap_or_default(),
        cluster_label: misconception.cluster_label.clone(),
        incorrect_answer: answer,
        student_count: misconception.student_count,
        confidence_score: misconception.confidence_score,
        status: misconception.status,
        is_priority: misconception.is_priority,
        concept_chain: vec![subject, unit, topic.clone()],
        topic,
        reasoning,
        evidence,
        future_score_impact: impact_estimate(misconception.student_count, attempts),
        performance_distribution: simulate_distribution(misconception.student_count, rng),
    }
}

/// Build an assessment section; `None` when nothing survives dedup
pub fn build_assessment_report<R: Rng>(
    assessment: &Assessment,
    misconceptions: &[Misconception],
    response_texts: &HashMap<Uuid, String>,
    attempts: i64,
    rng: &mut R,
) -> Option<AssessmentReport> {
    let mut seen_answers = HashSet::new();
    let mut cards = Vec::new();
    let mut topic_counts: Vec<(String, u64)> = Vec::new();

    for misconception in misconceptions {
        if !seen_answers.insert(answer_key(&misconception.question_id, &misconception.cluster_label)) {
            continue;
        }

        let card = build_card(misconception, Some(assessment), response_texts, attempts, rng);
        match topic_counts.iter_mut().find(|(topic, _)| *topic == card.topic) {
            Some((_, total)) => *total += card.student_count as u64,
            None => topic_counts.push((card.topic.clone(), card.student_count as u64)),
        }
        cards.push(card);
    }

    if cards.is_empty() {
        return None;
    }

    // First topic wins ties
    let (top_topic, top_count) = topic_counts
        .iter()
        .fold(None::<&(String, u64)>, |best, entry| match best {
            Some(b) if b.1 >= entry.1 => Some(b),
            _ => Some(entry),
        })
        .map(|(topic, count)| (topic.clone(), *count))
        .unwrap_or_else(|| (FALLBACK_TOPIC.to_string(), 0));

    let impact_summary = format!(
        "{} distinct misconception patterns detected. The primary struggle area appears to be '{}', affecting {} student responses.",
        cards.len(),
        top_topic,
        top_count
    );

    Some(AssessmentReport {
        assessment_id: assessment.assessment_id.clone(),
        title: assessment.title.clone(),
        subject: assessment.subject.clone(),
        created_at: assessment.created_at,
        misconception_count: cards.len(),
        student_count: attempts,
        impact_summary,
        misconceptions: cards,
    })
}

struct ReportInput {
    assessment: Assessment,
    misconceptions: Vec<Misconception>,
    response_texts: HashMap<Uuid, String>,
    attempts: i64,
}

/// Report over the instructor's assessments, optionally narrowed to one
pub async fn generate_report(
    pool: &SqlitePool,
    instructor_id: &str,
    status: ReportStatus,
    assessment_id: Option<&str>,
) -> Result<Vec<AssessmentReport>> {
    let owned = assessments::list_instructor_assessments(pool, instructor_id).await?;

    let mut inputs = Vec::new();
    for assessment in owned {
        if assessment_id.is_some_and(|id| id != assessment.assessment_id) {
            continue;
        }

        let filter = MisconceptionFilter {
            status: status.as_filter(),
            assessment_id: Some(assessment.assessment_id.clone()),
            instructor_id: None,
        };
        let misconceptions = dedup_by_signature(list_misconceptions(pool, &filter).await?);
        if misconceptions.is_empty() {
            continue;
        }

        let example_ids: Vec<Uuid> = misconceptions
            .iter()
            .flat_map(|m| m.example_ids.iter().copied())
            .collect();
        let response_texts = responses::load_response_texts(pool, &example_ids).await?;
        let attempts = responses::count_attempts(pool, &assessment.assessment_id).await?;

        inputs.push(ReportInput {
            assessment,
            misconceptions,
            response_texts,
            attempts,
        });
    }

    let mut rng = rand::thread_rng();
    let reports: Vec<AssessmentReport> = inputs
        .iter()
        .filter_map(|input| {
            build_assessment_report(
                &input.assessment,
                &input.misconceptions,
                &input.response_texts,
                input.attempts,
                &mut rng,
            )
        })
        .collect();

    tracing::debug!(
        instructor_id,
        assessments = reports.len(),
        "Generated misconception report"
    );

    Ok(reports)
}

/// Enriched card for a single record the caller already loaded
pub async fn enrich_single(pool: &SqlitePool, misconception: &Misconception) -> Result<MisconceptionCard> {
    let assessment = assessments::load_assessment(pool, &misconception.assessment_id).await?;
    let response_texts = responses::load_response_texts(pool, &misconception.example_ids).await?;
    let attempts = responses::count_attempts(pool, &misconception.assessment_id).await?;

    let mut rng = rand::thread_rng();
    Ok(build_card(
        misconception,
        assessment.as_ref(),
        &response_texts,
        attempts,
        &mut rng,
    ))
}

/// Valid records per topic above which an assessment is `critical`
const CRITICAL_RECORDS: usize = 3;

/// Severity of one topic in one assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendLevel {
    Clean,
    Issue,
    Critical,
}

impl TrendLevel {
    fn for_count(count: usize) -> Self {
        match count {
            0 => TrendLevel::Clean,
            c if c > CRITICAL_RECORDS => TrendLevel::Critical,
            _ => TrendLevel::Issue,
        }
    }
}

/// Direction of the last change seen walking a topic's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Stable,
    Improving,
    Worsening,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub assessment_id: String,
    pub title: String,
    /// Valid records for the topic in this assessment
    pub count: usize,
    pub status: TrendLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicTrend {
    pub topic: String,
    pub trend: TrendDirection,
    /// One point per assessment, oldest first
    pub history: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentRef {
    pub assessment_id: String,
    pub title: String,
}

/// Topic-by-assessment matrix of validated misconceptions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub summary: String,
    pub assessments: Vec<AssessmentRef>,
    pub matrix: Vec<TopicTrend>,
}

/// Walk counts oldest to newest; a rise after a non-zero count is
/// worsening, a drop to a non-zero count improving, and the last such move wins
fn trend_direction(counts: &[usize]) -> TrendDirection {
    let mut trend = TrendDirection::Stable;
    let mut last = 0;
    for &count in counts {
        if count > last && last > 0 {
            trend = TrendDirection::Worsening;
        } else if count < last && count > 0 {
            trend = TrendDirection::Improving;
        }
        last = count;
    }
    trend
}

/// Build the trend matrix
///
/// `assessments` must be oldest first. Each record counts once toward the
/// topic of its question; topics appear in order of first record.
pub fn build_trend_report(assessments: &[Assessment], misconceptions: &[Misconception]) -> TrendReport {
    if assessments.is_empty() {
        return TrendReport {
            summary: "No assessments found to analyze trends.".to_string(),
            assessments: Vec::new(),
            matrix: Vec::new(),
        };
    }

    let by_id: HashMap<&str, &Assessment> = assessments
        .iter()
        .map(|a| (a.assessment_id.as_str(), a))
        .collect();

    let mut topics: Vec<(String, HashMap<&str, usize>)> = Vec::new();
    for misconception in misconceptions {
        let Some(&assessment) = by_id.get(misconception.assessment_id.as_str()) else {
            continue;
        };
        let topic = assessment
            .question(&misconception.question_id)
            .map(|q| infer_topic(&q.text))
            .unwrap_or(FALLBACK_TOPIC);

        let index = match topics.iter().position(|(t, _)| t == topic) {
            Some(i) => i,
            None => {
                topics.push((topic.to_string(), HashMap::new()));
                topics.len() - 1
            }
        };
        *topics[index].1.entry(assessment.assessment_id.as_str()).or_insert(0) += 1;
    }

    let matrix: Vec<TopicTrend> = topics
        .iter()
        .map(|(topic, per_assessment)| {
            let history: Vec<TrendPoint> = assessments
                .iter()
                .map(|a| {
                    let count = per_assessment.get(a.assessment_id.as_str()).copied().unwrap_or(0);
                    TrendPoint {
                        assessment_id: a.assessment_id.clone(),
                        title: a.title.clone(),
                        count,
                        status: TrendLevel::for_count(count),
                    }
                })
                .collect();
            let counts: Vec<usize> = history.iter().map(|p| p.count).collect();
            TopicTrend {
                topic: topic.clone(),
                trend: trend_direction(&counts),
                history,
            }
        })
        .collect();

    // First topic wins ties
    let worst = topics
        .iter()
        .map(|(topic, per_assessment)| (topic, per_assessment.values().sum::<usize>()))
        .fold(None::<(&String, usize)>, |best, entry| match best {
            Some(b) if b.1 >= entry.1 => Some(b),
            _ => Some(entry),
        });

    let summary = match worst {
        None => "No significant misconception trends detected yet. Students differ in errors across assessments."
            .to_string(),
        Some((topic, _)) => format!(
            "Trend analysis: persistent struggles observed in '{}' across multiple assessments. \
             Recommend targeted revision on this topic before the next module.",
            topic
        ),
    };

    TrendReport {
        summary,
        assessments: assessments
            .iter()
            .map(|a| AssessmentRef {
                assessment_id: a.assessment_id.clone(),
                title: a.title.clone(),
            })
            .collect(),
        matrix,
    }
}

/// Trend matrix over the instructor's valid records
pub async fn generate_trends(pool: &SqlitePool, instructor_id: &str) -> Result<TrendReport> {
    let owned = assessments::list_instructor_assessments(pool, instructor_id).await?;
    let filter = MisconceptionFilter {
        status: Some(MisconceptionStatus::Valid),
        assessment_id: None,
        instructor_id: Some(instructor_id.to_string()),
    };
    let valid = list_misconceptions(pool, &filter).await?;

    let report = build_trend_report(&owned, &valid);
    tracing::debug!(instructor_id, topics = report.matrix.len(), "Generated trend report");
    Ok(report)
}

/// Per-assessment participation summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentSummary {
    pub assessment_id: String,
    pub title: String,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Distinct students with at least one stored response
    pub total_students: i64,
    /// Percentage of correct responses, one decimal
    pub avg_score: f64,
    /// "Active" once any response exists, otherwise "No submissions"
    pub status: &'static str,
}

pub fn summarize_assessment(assessment: &Assessment, totals: ResponseTotals) -> AssessmentSummary {
    let (avg_score, status) = if totals.responses == 0 {
        (0.0, "No submissions")
    } else {
        let pct = totals.correct as f64 / totals.responses as f64 * 100.0;
        ((pct * 10.0).round() / 10.0, "Active")
    };

    AssessmentSummary {
        assessment_id: assessment.assessment_id.clone(),
        title: assessment.title.clone(),
        subject: assessment.subject.clone(),
        created_at: assessment.created_at,
        total_students: totals.students,
        avg_score,
        status,
    }
}

/// Summaries of every assessment the instructor owns, oldest first
pub async fn generate_assessment_summaries(
    pool: &SqlitePool,
    instructor_id: &str,
) -> Result<Vec<AssessmentSummary>> {
    let owned = assessments::list_instructor_assessments(pool, instructor_id).await?;

    let mut summaries = Vec::with_capacity(owned.len());
    for assessment in &owned {
        let totals = responses::response_totals(pool, &assessment.assessment_id).await?;
        summaries.push(summarize_assessment(assessment, totals));
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptlens_common::models::Question;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assessment() -> Assessment {
        let questions = (1..=7)
            .map(|i| Question {
                question_id: format!("q{}", i),
                text: if i == 6 {
                    "Which JOIN keeps unmatched rows?".to_string()
                } else {
                    format!("Question {} about transactions", i)
                },
                correct_answer: "LEFT JOIN".to_string(),
                options: vec!["INNER JOIN".to_string(), "LEFT JOIN".to_string()],
            })
            .collect();

        Assessment {
            assessment_id: "a1".to_string(),
            instructor_id: "prof".to_string(),
            title: "Databases midterm".to_string(),
            subject: Some("Databases".to_string()),
            questions,
            created_at: Utc::now(),
        }
    }

    fn misconception(question: &str, label: &str, count: u32) -> Misconception {
        Misconception {
            misconception_id: Uuid::new_v4(),
            assessment_id: "a1".to_string(),
            question_id: question.to_string(),
            cluster_key: label.to_lowercase(),
            cluster_label: label.to_string(),
            student_count: count,
            confidence_score: 0.5 + 0.05 * count as f64,
            example_ids: vec![],
            status: MisconceptionStatus::Valid,
            is_priority: false,
            created_at: Utc::now(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_distribution_sums_to_count() {
        let mut rng = StdRng::seed_from_u64(7);
        for count in [0, 1, 2, 7, 15, 100, 1001] {
            let d = simulate_distribution(count, &mut rng);
            assert_eq!(d.top + d.average + d.struggling, count);
            assert_eq!(d.kind, "simulated");
        }
    }

    #[test]
    fn test_distribution_of_huge_count_does_not_wrap() {
        let mut rng = StdRng::seed_from_u64(3);
        let d = simulate_distribution(u32::MAX, &mut rng);
        assert_eq!(d.top as u64 + d.average as u64 + d.struggling as u64, u32::MAX as u64);
        assert!(d.top >= u32::MAX / 100 * 15);
        assert!(d.top <= u32::MAX / 100 * 30 + 30);
    }

    #[test]
    fn test_impact_is_capped_and_rounded() {
        assert_eq!(impact_estimate(10, 4), 5.0);
        assert_eq!(impact_estimate(1, 30), 0.3);
        assert_eq!(impact_estimate(3, 0), 5.0);
    }

    #[test]
    fn test_incorrect_answer_display() {
        assert_eq!(incorrect_answer("Misconception similar to: '2'"), "2");
        assert_eq!(incorrect_answer("Potential misconception: ' '"), "no answer");
        assert_eq!(incorrect_answer("Mixes up keys"), "an incorrect option");
    }

    #[test]
    fn test_signature_dedup_keeps_first() {
        let first = misconception("q1", "Misconception similar to: '2'", 15);
        let copy = misconception("q1", "Misconception similar to: '2'", 15);
        let kept = dedup_by_signature(vec![first.clone(), copy]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].misconception_id, first.misconception_id);
    }

    #[test]
    fn test_same_wrong_answer_collapses_within_question() {
        let mut rng = StdRng::seed_from_u64(1);
        let records = vec![
            misconception("q1", "Misconception similar to: 'INNER JOIN'", 6),
            misconception("q1", "Potential misconception: 'inner join'", 1),
            misconception("q2", "Misconception similar to: 'INNER JOIN'", 3),
            misconception("q1", "Renamed: confuses joins", 2),
            misconception("q1", "Renamed: confuses keys", 2),
        ];

        let report = build_assessment_report(&assessment(), &records, &HashMap::new(), 20, &mut rng)
            .unwrap();

        assert_eq!(report.misconception_count, 4);
        let labels: Vec<&str> = report.misconceptions.iter().map(|c| c.cluster_label.as_str()).collect();
        assert!(!labels.contains(&"Potential misconception: 'inner join'"));
    }

    #[test]
    fn test_card_enrichment() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut record = misconception("q6", "Misconception similar to: 'INNER JOIN'", 4);
        let answered = Uuid::new_v4();
        let blank = Uuid::new_v4();
        record.example_ids = vec![answered, blank, Uuid::new_v4()];
        let texts = HashMap::from([(answered, "inner join".to_string()), (blank, "".to_string())]);

        let card = build_card(&record, Some(&assessment()), &texts, 8, &mut rng);

        assert_eq!(card.question_text, "Which JOIN keeps unmatched rows?");
        assert_eq!(card.topic, "Joins");
        // position 5 → second unit
        assert_eq!(card.concept_chain, vec!["Databases", "Unit 2", "Joins"]);
        assert_eq!(card.evidence, vec!["inner join", SKIPPED_EVIDENCE]);
        assert_eq!(card.future_score_impact, 5.0);
        assert!(card.reasoning.contains("'INNER JOIN'"));
    }

    #[test]
    fn test_unknown_question_degrades_to_placeholders() {
        let mut rng = StdRng::seed_from_u64(3);
        let record = misconception("q99", "Misconception similar to: 'x'", 5);

        let card = build_card(&record, Some(&assessment()), &HashMap::new(), 10, &mut rng);

        assert_eq!(card.question_text, UNKNOWN_QUESTION);
        assert!(card.options.is_empty());
        assert_eq!(card.concept_chain, vec!["Databases", "Unit 1", FALLBACK_TOPIC]);
        assert_eq!(card.evidence, vec![SKIPPED_EVIDENCE; 3]);
    }

    #[test]
    fn test_summary_names_heaviest_topic() {
        let mut rng = StdRng::seed_from_u64(5);
        let records = vec![
            misconception("q1", "Misconception similar to: 'a'", 3),
            misconception("q6", "Misconception similar to: 'b'", 9),
            misconception("q2", "Misconception similar to: 'c'", 4),
        ];

        let report = build_assessment_report(&assessment(), &records, &HashMap::new(), 20, &mut rng)
            .unwrap();

        assert_eq!(
            report.impact_summary,
            "3 distinct misconception patterns detected. The primary struggle area appears to be 'Joins', affecting 9 student responses."
        );
    }

    #[test]
    fn test_report_status_parsing() {
        assert_eq!("all".parse::<ReportStatus>().unwrap(), ReportStatus::All);
        assert_eq!(
            "pending".parse::<ReportStatus>().unwrap(),
            ReportStatus::Only(MisconceptionStatus::Pending)
        );
        assert!("approved".parse::<ReportStatus>().is_err());
        assert_eq!(ReportStatus::default(), ReportStatus::Only(MisconceptionStatus::Valid));
    }

    fn in_assessment(assessment_id: &str, question: &str, label: &str) -> Misconception {
        Misconception {
            assessment_id: assessment_id.to_string(),
            ..misconception(question, label, 2)
        }
    }

    fn three_assessments() -> Vec<Assessment> {
        (1..=3)
            .map(|i| Assessment {
                assessment_id: format!("a{}", i),
                title: format!("Quiz {}", i),
                ..assessment()
            })
            .collect()
    }

    #[test]
    fn test_trend_matrix_levels_and_direction() {
        let mut records = vec![in_assessment("a1", "q1", "t-a1")];
        records.extend((0..5).map(|i| in_assessment("a2", "q1", &format!("t-a2-{}", i))));
        records.push(in_assessment("a2", "q6", "join-a2"));
        records.extend((0..2).map(|i| in_assessment("a3", "q2", &format!("t-a3-{}", i))));

        let report = build_trend_report(&three_assessments(), &records);

        assert_eq!(report.assessments.len(), 3);
        assert_eq!(report.assessments[0].title, "Quiz 1");
        assert_eq!(report.matrix.len(), 2);

        let transactions = &report.matrix[0];
        assert_eq!(transactions.topic, "Transactions");
        let counts: Vec<usize> = transactions.history.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![1, 5, 2]);
        let levels: Vec<TrendLevel> = transactions.history.iter().map(|p| p.status).collect();
        assert_eq!(levels, vec![TrendLevel::Issue, TrendLevel::Critical, TrendLevel::Issue]);
        assert_eq!(transactions.trend, TrendDirection::Improving);

        let joins = &report.matrix[1];
        assert_eq!(joins.topic, "Joins");
        assert_eq!(joins.history[0].status, TrendLevel::Clean);
        assert_eq!(joins.trend, TrendDirection::Stable);

        assert!(report.summary.contains("'Transactions'"));
    }

    #[test]
    fn test_trend_direction_needs_a_nonzero_baseline() {
        assert_eq!(trend_direction(&[0, 4]), TrendDirection::Stable);
        assert_eq!(trend_direction(&[1, 4]), TrendDirection::Worsening);
        assert_eq!(trend_direction(&[4, 0]), TrendDirection::Stable);
        assert_eq!(trend_direction(&[4, 1, 3]), TrendDirection::Worsening);
    }

    #[test]
    fn test_trend_summaries_without_data() {
        let empty = build_trend_report(&[], &[]);
        assert_eq!(empty.summary, "No assessments found to analyze trends.");
        assert!(empty.matrix.is_empty());

        let quiet = build_trend_report(&three_assessments(), &[]);
        assert!(quiet.summary.starts_with("No significant misconception trends"));
        assert_eq!(quiet.assessments.len(), 3);
        assert!(quiet.matrix.is_empty());
    }

    #[test]
    fn test_assessment_summary_scores() {
        let quiz = assessment();
        let active = summarize_assessment(
            &quiz,
            ResponseTotals {
                students: 2,
                responses: 3,
                correct: 1,
            },
        );
        assert_eq!(active.status, "Active");
        assert_eq!(active.total_students, 2);
        assert_eq!(active.avg_score, 33.3);

        let idle = summarize_assessment(&quiz, ResponseTotals::default());
        assert_eq!(idle.status, "No submissions");
        assert_eq!(idle.avg_score, 0.0);
        assert_eq!(idle.total_students, 0);
    }
}
