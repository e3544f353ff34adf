//! Test Helper Utilities
//!
//! Shared utilities for testing conceptlens-analysis

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use conceptlens_analysis::api::INSTRUCTOR_HEADER;
use chrono::Utc;
use conceptlens_analysis::config::{AnalysisSettings, ClusteringConfig};
use conceptlens_analysis::db::assessments::load_assessment;
use conceptlens_analysis::db::responses::store_submission;
use conceptlens_analysis::services::grader::grade_response;
use conceptlens_analysis::services::AnalysisQueue;
use conceptlens_analysis::{build_router, AppState};
use conceptlens_common::config::AnalyticsMode;
use conceptlens_common::db::{init_database, init_memory_database};
use conceptlens_common::events::EventBus;
use conceptlens_common::models::SubmittedResponse;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

pub const INSTRUCTOR: &str = "prof-ada";
pub const OTHER_INSTRUCTOR: &str = "prof-grace";

/// Router plus handles needed to observe background analysis
pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub events: EventBus,
    pub queue: AnalysisQueue,
    /// Keeps a file-backed database alive
    pub temp_dir: Option<TempDir>,
}

impl TestApp {
    /// In-memory database, production clustering (min cluster size 2)
    pub async fn new() -> Self {
        Self::with_mode(AnalyticsMode::Production).await
    }

    pub async fn with_mode(mode: AnalyticsMode) -> Self {
        let pool = init_memory_database().await.expect("in-memory database");
        Self::build(pool, ClusteringConfig::for_mode(mode), None)
    }

    /// File-backed database with a multi-connection pool
    pub async fn with_file_db(mode: AnalyticsMode) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let pool = init_database(&temp_dir.path().join("conceptlens.db"))
            .await
            .expect("file database");
        Self::build(pool, ClusteringConfig::for_mode(mode), Some(temp_dir))
    }

    fn build(pool: SqlitePool, clustering: ClusteringConfig, temp_dir: Option<TempDir>) -> Self {
        let events = EventBus::new(1024);
        let queue = AnalysisQueue::start(
            pool.clone(),
            events.clone(),
            clustering,
            AnalysisSettings::default(),
            CancellationToken::new(),
        );
        let state = AppState::new(pool.clone(), events.clone(), queue.clone());

        Self {
            router: build_router(state),
            pool,
            events,
            queue,
            temp_dir,
        }
    }

    /// Send a request and decode the JSON body (Null when empty)
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        instructor: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(instructor) = instructor {
            builder = builder.header(INSTRUCTOR_HEADER, instructor);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, json)
    }

    /// Register an assessment owned by `INSTRUCTOR`
    ///
    /// `questions` are (id, text, correct answer).
    pub async fn register(&self, assessment_id: &str, questions: &[(&str, &str, &str)]) {
        let questions: Vec<Value> = questions
            .iter()
            .map(|(id, text, answer)| {
                json!({
                    "question_id": id,
                    "text": text,
                    "correct_answer": answer,
                    "options": [answer, "other"],
                })
            })
            .collect();

        let (status, body) = self
            .send(
                "PUT",
                &format!("/assessments/{}", assessment_id),
                Some(INSTRUCTOR),
                Some(json!({
                    "title": format!("Assessment {}", assessment_id),
                    "subject": "Databases",
                    "questions": questions,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);
    }

    /// Submit one student's answers as (question id, text)
    pub async fn ingest(
        &self,
        student_id: &str,
        assessment_id: &str,
        answers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let responses: Vec<Value> = answers
            .iter()
            .map(|(question_id, text)| {
                json!({
                    "student_id": student_id,
                    "assessment_id": assessment_id,
                    "question_id": question_id,
                    "response_text": text,
                })
            })
            .collect();

        self.send(
            "POST",
            "/ingest/responses",
            None,
            Some(json!({ "responses": responses })),
        )
        .await
    }

    /// Grade and store one student's answers without scheduling analysis
    pub async fn seed(&self, student_id: &str, assessment_id: &str, answers: &[(&str, &str)]) {
        let assessment = load_assessment(&self.pool, assessment_id).await.unwrap();
        let now = Utc::now();
        let graded: Vec<_> = answers
            .iter()
            .map(|(question_id, text)| {
                grade_response(
                    assessment.as_ref(),
                    SubmittedResponse {
                        student_id: student_id.to_string(),
                        assessment_id: assessment_id.to_string(),
                        question_id: question_id.to_string(),
                        response_text: text.to_string(),
                        submitted_at: None,
                    },
                    now,
                )
            })
            .collect();

        store_submission(&self.pool, student_id, assessment_id, now, &graded)
            .await
            .unwrap();
    }

    /// Schedule one analysis run and wait for it
    pub async fn analyze(&self, assessment_id: &str) {
        self.queue.enqueue(assessment_id).await.unwrap();
        self.wait_for_analysis(assessment_id).await;
    }

    /// Wait until every incorrect response of the assessment is processed
    /// and no run for it is queued
    pub async fn wait_for_analysis(&self, assessment_id: &str) {
        let waited = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let pending: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM responses WHERE assessment_id = ? AND processed = 0 AND is_correct = 0",
                )
                .bind(assessment_id)
                .fetch_one(&self.pool)
                .await
                .unwrap();
                if pending == 0 && self.queue.pending_count().await == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "analysis of {} did not finish", assessment_id);
    }

    /// Misconception ids from GET /misconceptions?status=all
    pub async fn misconceptions(&self, assessment_id: &str) -> Vec<Value> {
        let (status, body) = self
            .send(
                "GET",
                &format!("/misconceptions?status=all&assessment_id={}", assessment_id),
                Some(INSTRUCTOR),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().cloned().unwrap_or_default()
    }
}
