//! Event types for the ConceptLens event system
//!
//! Analysis runs execute in the background; their outcomes are published
//! here instead of being swallowed, so SSE clients and tests can observe them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Analysis pipeline events
///
/// Broadcast via [`EventBus`] and serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnalysisEvent {
    /// A run was placed on the queue
    AnalysisQueued {
        assessment_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A worker acquired the assessment lock and started the run
    AnalysisStarted {
        assessment_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Clustering one question group failed; sibling groups continue
    QuestionClusteringFailed {
        assessment_id: String,
        question_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Run finished
    AnalysisCompleted {
        assessment_id: String,
        /// Incorrect responses clustered, earlier ones included
        responses_analyzed: usize,
        /// Question groups clustered
        questions_analyzed: usize,
        /// Records inserted
        misconceptions_created: usize,
        /// Pending records brought up to date
        #[serde(default)]
        misconceptions_refreshed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run aborted before completion
    AnalysisFailed {
        assessment_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl AnalysisEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            AnalysisEvent::AnalysisQueued { .. } => "AnalysisQueued",
            AnalysisEvent::AnalysisStarted { .. } => "AnalysisStarted",
            AnalysisEvent::QuestionClusteringFailed { .. } => "QuestionClusteringFailed",
            AnalysisEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            AnalysisEvent::AnalysisFailed { .. } => "AnalysisFailed",
        }
    }

    pub fn assessment_id(&self) -> &str {
        match self {
            AnalysisEvent::AnalysisQueued { assessment_id, .. }
            | AnalysisEvent::AnalysisStarted { assessment_id, .. }
            | AnalysisEvent::QuestionClusteringFailed { assessment_id, .. }
            | AnalysisEvent::AnalysisCompleted { assessment_id, .. }
            | AnalysisEvent::AnalysisFailed { assessment_id, .. } => assessment_id,
        }
    }

    /// True for events that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisEvent::AnalysisCompleted { .. } | AnalysisEvent::AnalysisFailed { .. }
        )
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a tokio broadcast channel. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AnalysisEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
