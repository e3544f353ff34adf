//! Database access for conceptlens-analysis
//!
//! Runtime `sqlx` queries over the schema created by
//! `conceptlens_common::db`. Timestamps are RFC 3339 text, ids UUID text.

pub mod assessments;
pub mod audit;
pub mod misconceptions;
pub mod responses;

use chrono::{DateTime, Utc};
use conceptlens_common::{Error, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {} '{}': {}", column, value, e)))
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
