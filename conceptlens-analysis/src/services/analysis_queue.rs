//! Background analysis queue and worker pool
//!
//! Ingestion enqueues assessment ids without waiting. A fixed pool of workers
//! drains the queue; runs for the same assessment are serialised by a keyed
//! lock while different assessments proceed in parallel. Every run ends in an
//! `AnalysisCompleted` or `AnalysisFailed` event.
//!
//! An assessment already waiting in the queue is not queued twice: the
//! waiting run will read the newer responses too.

use chrono::Utc;
use conceptlens_common::events::{AnalysisEvent, EventBus};
use conceptlens_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::analysis_job::run_analysis;
use crate::config::{AnalysisSettings, ClusteringConfig};

/// Result of [`AnalysisQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new run was scheduled
    Queued,
    /// A run for this assessment was already waiting
    Coalesced,
}

/// Handle to the analysis worker pool; cloning shares the pool
#[derive(Clone)]
pub struct AnalysisQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tx: mpsc::UnboundedSender<String>,
    /// Assessments queued but not yet picked up under their lock
    pending: Mutex<HashSet<String>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    events: EventBus,
    last_error: Arc<RwLock<Option<String>>>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct WorkerContext {
    pool: SqlitePool,
    config: ClusteringConfig,
    settings: AnalysisSettings,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl AnalysisQueue {
    /// Spawn `settings.workers` workers on the current runtime
    pub fn start(
        pool: SqlitePool,
        events: EventBus,
        config: ClusteringConfig,
        settings: AnalysisSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let queue = Self {
            inner: Arc::new(QueueInner {
                tx,
                pending: Mutex::new(HashSet::new()),
                locks: Mutex::new(HashMap::new()),
                events,
                last_error: Arc::new(RwLock::new(None)),
                shutdown,
                workers: Mutex::new(Vec::new()),
            }),
        };

        let ctx = Arc::new(WorkerContext {
            pool,
            config,
            settings,
            rx: Mutex::new(rx),
        });

        let handles: Vec<JoinHandle<()>> = (0..settings.workers.max(1))
            .map(|worker_id| {
                let queue = queue.clone();
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move { queue.worker_loop(worker_id, ctx).await })
            })
            .collect();

        // No other reference to `workers` exists yet
        if let Ok(mut workers) = queue.inner.workers.try_lock() {
            *workers = handles;
        }

        tracing::info!(workers = settings.workers, "Analysis queue started");
        queue
    }

    /// Schedule a run for `assessment_id` without waiting for it
    pub async fn enqueue(&self, assessment_id: &str) -> Result<EnqueueOutcome> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::Internal("Analysis queue is shut down".to_string()));
        }

        let mut pending = self.inner.pending.lock().await;
        if pending.contains(assessment_id) {
            tracing::debug!(assessment_id, "Analysis already queued, coalescing");
            return Ok(EnqueueOutcome::Coalesced);
        }

        self.inner
            .tx
            .send(assessment_id.to_string())
            .map_err(|_| Error::Internal("Analysis queue is closed".to_string()))?;
        pending.insert(assessment_id.to_string());
        drop(pending);

        tracing::info!(assessment_id, "Analysis queued");
        self.inner.events.emit_lossy(AnalysisEvent::AnalysisQueued {
            assessment_id: assessment_id.to_string(),
            timestamp: Utc::now(),
        });

        Ok(EnqueueOutcome::Queued)
    }

    /// Number of assessments waiting for a worker
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Most recent run failure, for diagnostics
    pub fn last_error(&self) -> Arc<RwLock<Option<String>>> {
        Arc::clone(&self.inner.last_error)
    }

    /// Stop accepting work and wait for workers to exit
    ///
    /// A run already in progress finishes first.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self.inner.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Analysis worker ended abnormally");
            }
        }
        tracing::info!("Analysis queue stopped");
    }

    async fn worker_loop(&self, worker_id: usize, ctx: Arc<WorkerContext>) {
        tracing::debug!(worker_id, "Analysis worker started");

        loop {
            let next = tokio::select! {
                _ = self.inner.shutdown.cancelled() => None,
                job = async { ctx.rx.lock().await.recv().await } => job,
            };

            let Some(assessment_id) = next else {
                break;
            };

            self.process(worker_id, &ctx, assessment_id).await;
        }

        tracing::debug!(worker_id, "Analysis worker stopped");
    }

    async fn process(&self, worker_id: usize, ctx: &Arc<WorkerContext>, assessment_id: String) {
        let lock = self.assessment_lock(&assessment_id).await;
        let guard = lock.lock().await;

        self.inner.pending.lock().await.remove(&assessment_id);

        tracing::info!(worker_id, assessment_id = %assessment_id, "Analysis started");
        self.inner.events.emit_lossy(AnalysisEvent::AnalysisStarted {
            assessment_id: assessment_id.clone(),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let run = {
            let ctx = Arc::clone(ctx);
            let events = self.inner.events.clone();
            let assessment_id = assessment_id.clone();
            tokio::spawn(async move {
                run_analysis(&ctx.pool, &events, &assessment_id, &ctx.config, &ctx.settings).await
            })
        };

        let result = match run.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("Analysis task panicked: {}", e)),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                tracing::info!(
                    assessment_id = %assessment_id,
                    responses = outcome.responses_analyzed,
                    new_responses = outcome.responses_new,
                    questions = outcome.questions_analyzed,
                    failed_questions = outcome.questions_failed,
                    created = outcome.misconceptions_created,
                    refreshed = outcome.misconceptions_refreshed,
                    unchanged = outcome.misconceptions_unchanged,
                    duration_ms,
                    "Analysis completed"
                );
                self.inner.events.emit_lossy(AnalysisEvent::AnalysisCompleted {
                    assessment_id: assessment_id.clone(),
                    responses_analyzed: outcome.responses_analyzed,
                    questions_analyzed: outcome.questions_analyzed,
                    misconceptions_created: outcome.misconceptions_created,
                    misconceptions_refreshed: outcome.misconceptions_refreshed,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::error!(assessment_id = %assessment_id, error = %error, "Analysis failed");
                *self.inner.last_error.write().await =
                    Some(format!("analysis of {} failed: {}", assessment_id, error));
                self.inner.events.emit_lossy(AnalysisEvent::AnalysisFailed {
                    assessment_id: assessment_id.clone(),
                    error,
                    timestamp: Utc::now(),
                });
            }
        }

        drop(guard);
        self.release_lock(&assessment_id, lock).await;
    }

    async fn assessment_lock(&self, assessment_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        Arc::clone(
            locks
                .entry(assessment_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop the keyed lock entry once no other worker holds a clone of it
    async fn release_lock(&self, assessment_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.inner.locks.lock().await;
        // One reference in the map plus ours
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(assessment_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptlens_common::config::AnalyticsMode;
    use conceptlens_common::db::init_memory_database;
    use std::time::Duration;

    async fn next_terminal(rx: &mut tokio::sync::broadcast::Receiver<AnalysisEvent>) -> AnalysisEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.is_terminal() {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_assessment_completes() {
        let pool = init_memory_database().await.unwrap();
        let events = EventBus::new(32);
        let mut rx = events.subscribe();
        let queue = AnalysisQueue::start(
            pool,
            events,
            ClusteringConfig::for_mode(AnalyticsMode::Demo),
            AnalysisSettings::default(),
            CancellationToken::new(),
        );

        assert_eq!(queue.enqueue("a1").await.unwrap(), EnqueueOutcome::Queued);

        match next_terminal(&mut rx).await {
            AnalysisEvent::AnalysisCompleted {
                assessment_id,
                misconceptions_created,
                ..
            } => {
                assert_eq!(assessment_id, "a1");
                assert_eq!(misconceptions_created, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_load_failure_reports_failed_run() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("DROP TABLE responses").execute(&pool).await.unwrap();
        let events = EventBus::new(32);
        let mut rx = events.subscribe();
        let queue = AnalysisQueue::start(
            pool,
            events,
            ClusteringConfig::default(),
            AnalysisSettings::default(),
            CancellationToken::new(),
        );
        assert!(queue.last_error().read().await.is_none());

        queue.enqueue("a1").await.unwrap();

        match next_terminal(&mut rx).await {
            AnalysisEvent::AnalysisFailed { assessment_id, error, .. } => {
                assert_eq!(assessment_id, "a1");
                assert!(error.contains("Failed to load responses for a1"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        let last_error = queue.last_error().read().await.clone();
        assert!(last_error.unwrap().starts_with("analysis of a1 failed"));

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_runs_for_one_assessment_never_overlap() {
        let pool = init_memory_database().await.unwrap();
        for i in 0..200 {
            let student = format!("s{}", i);
            let response = conceptlens_common::models::StudentResponse {
                response_id: uuid::Uuid::new_v4(),
                student_id: student.clone(),
                assessment_id: "a1".to_string(),
                question_id: format!("q{}", i % 4),
                response_text: format!("answer {}", i % 7),
                is_correct: false,
                processed: false,
                submitted_at: Utc::now(),
            };
            crate::db::responses::store_submission(&pool, &student, "a1", Utc::now(), &[response])
                .await
                .unwrap();
        }

        let events = EventBus::new(1024);
        let mut rx = events.subscribe();
        let settings = AnalysisSettings {
            workers: 4,
            mark_processed: false,
            ..AnalysisSettings::default()
        };
        let queue = AnalysisQueue::start(
            pool,
            events,
            ClusteringConfig::for_mode(AnalyticsMode::Demo),
            settings,
            CancellationToken::new(),
        );

        let mut runs = 0;
        for _ in 0..30 {
            if queue.enqueue("a1").await.unwrap() == EnqueueOutcome::Queued {
                runs += 1;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let mut finished = 0;
        let mut running = false;
        while finished < runs {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                AnalysisEvent::AnalysisStarted { .. } => {
                    assert!(!running, "a second run started before the first ended");
                    running = true;
                }
                AnalysisEvent::AnalysisCompleted { .. } | AnalysisEvent::AnalysisFailed { .. } => {
                    assert!(running);
                    running = false;
                    finished += 1;
                }
                _ => {}
            }
        }
        assert!(runs >= 1);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_errors() {
        let pool = init_memory_database().await.unwrap();
        let queue = AnalysisQueue::start(
            pool,
            EventBus::new(8),
            ClusteringConfig::default(),
            AnalysisSettings::default(),
            CancellationToken::new(),
        );

        queue.shutdown().await;

        assert!(queue.enqueue("a1").await.is_err());
    }
}
