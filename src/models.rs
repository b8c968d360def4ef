//! Data models shared by the merge stages
//!
//! This module contains the identifiers used to address per-subject sources
//! and the fixed output column contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, Result};

/// A study participant identifier (numeric string, e.g. `1011`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Parse and validate a subject identifier
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > 10 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(MergeError::InvalidSubject(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The identifier as written in file names
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as an integer (leading zeros dropped)
    #[must_use]
    pub fn numeric(&self) -> u64 {
        // Validated as at most 10 ASCII digits, which always fits.
        self.0.parse().unwrap_or_default()
    }

    /// True if `value` names this subject.
    ///
    /// Survey exports encode ids inconsistently (`1011`, `1011.0`, ` 1011`),
    /// so numbers are compared numerically and anything else as trimmed text.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        #[allow(clippy::cast_precision_loss)]
        let own = self.numeric() as f64;
        match value.parse::<f64>() {
            Ok(number) => (number - own).abs() < f64::EPSILON,
            Err(_) => value == self.0,
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = MergeError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

/// One of the two task runs recorded per subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Run {
    /// First run, tagged `01`
    One,
    /// Second run, tagged `02`
    Two,
}

impl Run {
    /// Both runs in order
    pub const ALL: [Self; 2] = [Self::One, Self::Two];

    /// Tag used in file names and in the `run` column
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::One => "01",
            Self::Two => "02",
        }
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The logical input sources merged for each subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Fitabase daily activity (required)
    Activity,
    /// Fitabase sleep stages by day
    Sleep,
    /// TextMagic SMS send log
    Sms,
    /// REDCap daily surveys, one file shared by all subjects
    Survey,
    /// Task event log for one run
    Events(Run),
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activity => f.write_str("activity"),
            Self::Sleep => f.write_str("sleep"),
            Self::Sms => f.write_str("sms"),
            Self::Survey => f.write_str("survey"),
            Self::Events(run) => write!(f, "run-{run} events"),
        }
    }
}

/// Output column order for the combined file.
///
/// Per-run files use the same order without `ActivityDate` and without the
/// leading `sub` and `run` columns.
pub const OUTPUT_COLUMNS: [&str; 49] = [
    "sub",
    "run",
    "onset",
    "duration",
    "trial",
    "trial_type",
    "rating",
    "resp_time",
    "subj_day_num",
    "sms_timestamp",
    "msg_start",
    "ActivityDate",
    "TotalSteps",
    "TotalSteps_norm",
    "TotalDistance",
    "VeryActiveDistance",
    "ModeratelyActiveDistance",
    "LightActiveDistance",
    "SedentaryActiveDistance",
    "VeryActiveMinutes",
    "FairlyActiveMinutes",
    "LightlyActiveMinutes",
    "SedentaryMinutes",
    "Calories",
    "Floors",
    "CaloriesBMR",
    "MarginalCalories",
    "RestingHeartRate",
    "RestingHeartRate_norm",
    "valence",
    "s_ns",
    "msg_id",
    "message",
    "survey_complete_timestamp",
    "location",
    "lap",
    "hap",
    "han",
    "lan",
    "la",
    "p",
    "n",
    "ha",
    "self_efficacy_daily",
    "TotalSleepRecords",
    "TotalMinutesAsleep",
    "TotalMinutesLight",
    "TotalMinutesDeep",
    "TotalMinutesREM",
];

/// Sleep columns carried into the output
pub const SLEEP_COLUMNS: [&str; 5] = [
    "TotalSleepRecords",
    "TotalMinutesAsleep",
    "TotalMinutesLight",
    "TotalMinutesDeep",
    "TotalMinutesREM",
];

/// Columns written to each per-run file
#[must_use]
pub fn run_file_columns() -> Vec<&'static str> {
    OUTPUT_COLUMNS
        .iter()
        .skip(2)
        .copied()
        .filter(|column| *column != "ActivityDate")
        .collect()
}
