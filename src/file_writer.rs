//! File writing for merged output.
//!
//! This module writes the per-run and combined CSV tables and the JSON batch
//! report. Every file is written to a temporary sibling first and renamed
//! into place, so a failed write never leaves a truncated output behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use polars::prelude::DataFrame;

use crate::error::Result;
use crate::finalizer::{combine, run_table};
use crate::frame::write_csv;
use crate::models::{Run, SubjectId};

/// Default name of the combined output file
pub const COMBINED_FILE_NAME: &str = "final_merged_data_all_norm.csv";

/// Per-run output file name for a subject
///
/// # Examples
///
/// ```
/// use health_merge::file_writer::run_file_name;
/// use health_merge::models::{Run, SubjectId};
///
/// let subject = SubjectId::new("1011").unwrap();
/// assert_eq!(
///     run_file_name(&subject, Run::One),
///     "sub-1011_task-HealthMessage_run-01_events_all_vars.csv"
/// );
/// ```
#[must_use]
pub fn run_file_name(subject: &SubjectId, run: Run) -> String {
    format!("sub-{subject}_task-HealthMessage_run-{}_events_all_vars.csv", run.tag())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_staging<F>(staging: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut writer = BufWriter::new(File::create(staging)?);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging = temporary_path(path);
    match write_staging(&staging, write) {
        Ok(()) => {
            fs::rename(&staging, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&staging);
            Err(e)
        }
    }
}

/// Write a table as CSV to `path`
pub fn write_table(table: &DataFrame, path: &Path) -> Result<()> {
    write_atomically(path, |writer| write_csv(table, writer))?;
    debug!(path = %path.display(), rows = table.height(), "Wrote table");
    Ok(())
}

/// Write one CSV per run for a subject.
///
/// Runs without any rows are skipped. Returns the paths written.
pub fn write_run_files(subject: &SubjectId, subject_table: &DataFrame, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for run in Run::ALL {
        let rows = run_table(subject_table, run)?;
        if rows.height() == 0 {
            info!(subject = %subject, run = %run, "No events for run; not writing a file");
            continue;
        }

        let path = output_dir.join(run_file_name(subject, run));
        write_table(&rows, &path)?;
        written.push(path);
    }

    Ok(written)
}

/// Write the combined table for all subjects, sorted by subject and date.
///
/// Returns the number of data rows written.
pub fn write_combined(subject_tables: &[DataFrame], path: &Path) -> Result<usize> {
    let combined = combine(subject_tables)?;
    write_table(&combined, path)?;
    info!(path = %path.display(), rows = combined.height(), "Wrote combined file");
    Ok(combined.height())
}

/// Write any serializable value as pretty JSON
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    write_atomically(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, value)?;
        writeln!(writer)?;
        Ok(())
    })
}
