//! # ConceptLens Common Library
//!
//! Shared code for ConceptLens services including:
//! - Domain models (responses, misconceptions, question banks)
//! - Database initialization and schema
//! - Event types (AnalysisEvent) and the EventBus
//! - Configuration loading (CLI → ENV → TOML → defaults)
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
