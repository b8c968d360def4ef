use std::time::{Duration, Instant};

use ::metrics::{counter, histogram};

use crate::models::SourceKind;

/// Metric names emitted by the merge pipeline.
///
/// Nothing is recorded unless the embedding application installs a
/// `metrics` recorder; without one every call is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    /// Counter of subjects by outcome
    pub subjects_total: &'static str,
    /// Counter of rows produced per stage
    pub rows_total: &'static str,
    /// Histogram of stage durations in seconds
    pub stage_duration: &'static str,
    /// Counter of output files written
    pub files_written_total: &'static str,
    /// Counter of optional sources that were absent or unusable
    pub missing_sources_total: &'static str,
    /// Counter of sources matched by more than one file
    pub ambiguous_sources_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            subjects_total: "health_merge_subjects_total",
            rows_total: "health_merge_rows_total",
            stage_duration: "health_merge_stage_duration_seconds",
            files_written_total: "health_merge_files_written_total",
            missing_sources_total: "health_merge_missing_sources_total",
            ambiguous_sources_total: "health_merge_ambiguous_sources_total",
        }
    }
}

impl MetricsCollector {
    /// Record a finished subject; `status` is `processed` or `excluded`
    pub fn record_subject(&self, status: &'static str) {
        counter!(self.subjects_total, "status" => status).increment(1);
    }

    /// Record the row count a stage produced
    pub fn record_rows(&self, stage: &'static str, rows: usize) {
        counter!(self.rows_total, "stage" => stage).increment(rows as u64);
    }

    /// Record how long a stage took
    pub fn record_stage_duration(&self, stage: &'static str, duration: Duration) {
        histogram!(self.stage_duration, "stage" => stage).record(duration.as_secs_f64());
    }

    /// Record a source that was not found for a subject
    pub fn record_missing_source(&self, kind: SourceKind) {
        counter!(self.missing_sources_total, "kind" => kind.to_string()).increment(1);
    }

    /// Record a naming pattern that matched more than one file
    pub fn record_ambiguous_source(&self, kind: SourceKind) {
        counter!(self.ambiguous_sources_total, "kind" => kind.to_string()).increment(1);
    }

    /// Record an output file written
    pub fn record_file_written(&self) {
        counter!(self.files_written_total).increment(1);
    }
}

/// Times a pipeline stage and reports it on `finish`
pub struct MetricsTimer {
    collector: MetricsCollector,
    stage: &'static str,
    start: Instant,
}

impl MetricsTimer {
    /// Start timing `stage`
    pub fn new(collector: MetricsCollector, stage: &'static str) -> Self {
        Self {
            collector,
            stage,
            start: Instant::now(),
        }
    }

    /// Record and return the elapsed time
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        self.collector.record_stage_duration(self.stage, duration);
        duration
    }
}
