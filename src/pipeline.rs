//! Per-subject processing and batch orchestration.
//!
//! A batch processes subjects strictly in the given order. A subject that
//! fails is reported and skipped; the others continue. Output files for a
//! subject are written only once its table is complete, and the combined
//! file only once every subject has been attempted.

use std::path::PathBuf;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::file_writer::{write_combined, write_run_files, COMBINED_FILE_NAME};
use crate::finalizer::finalize;
use crate::joiner::join_by_date;
use crate::loader::load_subject;
use crate::locator::SourceLocator;
use crate::logging::OperationTimer;
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::models::SubjectId;
use crate::resolver::{resolve_events, MessageKeyStrategy};

/// The finished combined-schema table for one subject
#[derive(Debug, Clone)]
pub struct SubjectTable {
    /// Subject the rows belong to
    pub subject: SubjectId,
    /// Rows in the combined output schema
    pub table: DataFrame,
}

/// What a batch should write and where
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Directory all output files go to
    pub output_dir: PathBuf,
    /// Write one file per subject and run
    pub write_run_files: bool,
    /// Write the combined file for the batch
    pub write_combined: bool,
    /// File name of the combined file inside `output_dir`
    pub combined_file_name: String,
}

impl OutputOptions {
    /// Both per-run and combined output into `output_dir`
    pub fn all(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            write_run_files: true,
            write_combined: true,
            combined_file_name: COMBINED_FILE_NAME.to_string(),
        }
    }
}

/// A subject left out of the batch and why
#[derive(Debug, Clone, Serialize)]
pub struct ExcludedSubject {
    /// Subject that was left out
    pub subject: SubjectId,
    /// The error that ended its processing
    pub reason: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Subjects merged, in processing order
    pub processed: Vec<SubjectId>,
    /// Subjects left out, with reasons
    pub excluded: Vec<ExcludedSubject>,
    /// Every output file written, run files first
    pub files_written: Vec<PathBuf>,
    /// Rows in the combined file, if one was written
    pub combined_rows: Option<usize>,
}

impl BatchReport {
    /// True if no subject made it through
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}

/// The merge pipeline over an injected source locator
pub struct Pipeline<L> {
    locator: L,
    strategy: MessageKeyStrategy,
    metrics: MetricsCollector,
}

impl<L: SourceLocator> Pipeline<L> {
    /// A pipeline reading through `locator` and keying messages by `strategy`
    pub fn new(locator: L, strategy: MessageKeyStrategy) -> Self {
        Self {
            locator,
            strategy,
            metrics: MetricsCollector::default(),
        }
    }

    /// The locator this pipeline reads from
    pub fn locator(&self) -> &L {
        &self.locator
    }

    /// Load, join, resolve and finalize one subject
    pub fn process_subject(&self, subject: &SubjectId) -> Result<SubjectTable> {
        let operation = OperationTimer::new(&format!("merge subject {subject}"));

        let timer = MetricsTimer::new(self.metrics, "load");
        let sources = load_subject(&self.locator, subject, &self.metrics)?;
        timer.finish();

        let timer = MetricsTimer::new(self.metrics, "join");
        let day = join_by_date(&sources)?;
        self.metrics.record_rows("join", day.height());
        timer.finish();

        let timer = MetricsTimer::new(self.metrics, "resolve");
        let resolved = resolve_events(day, &sources.events, self.strategy)?;
        self.metrics.record_rows("resolve", resolved.height());
        timer.finish();

        let timer = MetricsTimer::new(self.metrics, "finalize");
        let table = finalize(resolved, subject)?;
        timer.finish();
        operation.finish();

        Ok(SubjectTable {
            subject: subject.clone(),
            table,
        })
    }

    /// Process every subject in order and write the requested output.
    ///
    /// Never fails as a whole: per-subject problems are recorded in the
    /// report, and a batch with no processed subjects writes no combined
    /// file.
    pub fn run_batch(&self, subjects: &[SubjectId], output: &OutputOptions) -> BatchReport {
        let mut report = BatchReport::default();
        let mut tables = Vec::new();

        for subject in subjects {
            match self.process_and_write(subject, output) {
                Ok((table, written)) => {
                    info!(subject = %subject, rows = table.height(), files = written.len(), "Merged subject");
                    self.metrics.record_subject("processed");
                    report.processed.push(subject.clone());
                    report.files_written.extend(written);
                    tables.push(table);
                }
                Err(e) => {
                    warn!(subject = %subject, "Subject {subject} excluded: {e}");
                    self.metrics.record_subject("excluded");
                    report.excluded.push(ExcludedSubject {
                        subject: subject.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if output.write_combined {
            self.write_combined_output(&tables, output, &mut report);
        }

        report
    }

    fn process_and_write(&self, subject: &SubjectId, output: &OutputOptions) -> Result<(DataFrame, Vec<PathBuf>)> {
        let SubjectTable { table, .. } = self.process_subject(subject)?;

        let written = if output.write_run_files {
            write_run_files(subject, &table, &output.output_dir)?
        } else {
            Vec::new()
        };
        for _ in &written {
            self.metrics.record_file_written();
        }

        Ok((table, written))
    }

    fn write_combined_output(&self, tables: &[DataFrame], output: &OutputOptions, report: &mut BatchReport) {
        for excluded in &report.excluded {
            warn!("Subject {} excluded from combined file: {}", excluded.subject, excluded.reason);
        }

        if tables.is_empty() {
            warn!("No subjects were processed; combined file not written");
            return;
        }

        let path = output.output_dir.join(&output.combined_file_name);
        match write_combined(tables, &path) {
            Ok(rows) => {
                self.metrics.record_file_written();
                report.combined_rows = Some(rows);
                report.files_written.push(path);
            }
            Err(e) => warn!(path = %path.display(), "Combined file not written: {e}"),
        }
    }
}
