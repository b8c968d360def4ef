//! Health Merge - Per-subject study data alignment
//!
//! A Rust library for merging the per-subject exports of a health messaging
//! study into analysis-ready tables.
//!
//! # Features
//!
//! - Load wearable activity and sleep exports, SMS send logs, daily surveys
//!   and fMRI task event logs
//! - Align the day-keyed sources on a normalized date
//! - Match survey message descriptions to task events by composite key
//! - Per-subject z-scores for step counts and resting heart rate
//! - Per-run and combined CSV output with a fixed column schema

/// Configuration management
pub mod config;
/// Date normalization helpers
pub mod dates;
/// Error types
pub mod error;
/// CSV and JSON output
pub mod file_writer;
/// Normalization and output shaping
pub mod finalizer;
/// Text-typed data frame helpers
pub mod frame;
/// Date-key joins
pub mod joiner;
/// Per-source loading and normalization
pub mod loader;
/// Source file lookup
pub mod locator;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and output schema
pub mod models;
/// Subject and batch orchestration
pub mod pipeline;
/// Message identity resolution
pub mod resolver;
/// Input validation
pub mod validation;

// Re-export key components for easier access
pub use error::{MergeError, Result};
pub use locator::{DirectoryLocator, SourceLocator};
pub use models::{Run, SourceKind, SubjectId};
pub use pipeline::{BatchReport, OutputOptions, Pipeline, SubjectTable};
pub use resolver::MessageKeyStrategy;
