//! Analysis pipeline services
//!
//! Leaf-first: grading, grouping, similarity and clustering, the analysis
//! run and its worker queue, ingestion, triage and the read-time report.

pub mod analysis_job;
pub mod analysis_queue;
pub mod clustering;
pub mod grader;
pub mod grouper;
pub mod ingest;
pub mod report;
pub mod similarity;
pub mod topics;
pub mod triage;

pub use analysis_job::{run_analysis, AnalysisOutcome};
pub use analysis_queue::{AnalysisQueue, EnqueueOutcome};
pub use clustering::cluster_responses;
pub use ingest::{ingest_submission, IngestReceipt};
pub use report::{generate_report, ReportStatus};
pub use triage::{apply_triage, TriageAction};
