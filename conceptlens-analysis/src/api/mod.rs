//! HTTP API handlers for conceptlens-analysis
//!
//! REST endpoints for ingestion, triage and reports, plus an SSE stream of
//! analysis events.

pub mod assessments;
pub mod health;
pub mod ingest;
pub mod instructor;
pub mod misconceptions;
pub mod reports;
pub mod sse;

pub use assessments::assessment_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use instructor::{InstructorId, INSTRUCTOR_HEADER};
pub use misconceptions::misconception_routes;
pub use reports::report_routes;
pub use sse::event_stream;
