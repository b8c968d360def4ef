//! Error types for the health-merge library.
//!
//! This module provides custom error types using `thiserror` for the merge
//! pipeline. Only `MissingRequiredSource` ends processing for a subject;
//! the optional-source and ambiguity variants are reported as notices.

use thiserror::Error;

/// Errors that can occur while merging subject data.
#[derive(Error, Debug)]
pub enum MergeError {
    /// A required input (daily activity) is absent for a subject
    #[error("Missing required {kind} source for subject {subject}")]
    MissingRequiredSource {
        /// Subject identifier
        subject: String,
        /// Source kind that was not found
        kind: String,
    },

    /// An optional input is absent; processing continues without it
    #[error("No {kind} source for subject {subject}; continuing without it")]
    MissingOptionalSource {
        /// Subject identifier
        subject: String,
        /// Source kind that was not found
        kind: String,
    },

    /// More than one file matched a source naming pattern
    #[error("{count} candidate files for {kind} source; using {chosen}")]
    AmbiguousSource {
        /// Source kind that matched more than once
        kind: String,
        /// Number of candidates found
        count: usize,
        /// File name that was selected
        chosen: String,
    },

    /// A date or numeric value could not be parsed
    #[error("Invalid format: {0}")]
    Format(String),

    /// Subject identifier is not a numeric id
    #[error("Invalid subject id: {0}")]
    InvalidSubject(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A table operation referenced a column layout that does not fit
    #[error("Table schema error: {0}")]
    Schema(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Reading, joining or reshaping a data frame failed
    #[error("Data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for Result with `MergeError`
pub type Result<T> = std::result::Result<T, MergeError>;
