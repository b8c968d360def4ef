//! Source lookup.
//!
//! The pipeline never touches the filesystem itself; it asks a
//! [`SourceLocator`] for each source table. [`DirectoryLocator`] is the
//! implementation over a flat raw-data directory using the export naming
//! conventions of the study.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{MergeError, Result};
use crate::frame::read_path;
use crate::metrics::MetricsCollector;
use crate::models::{Run, SourceKind, SubjectId};

/// Finds and loads the source tables for a subject.
///
/// `Ok(None)` means the source does not exist for this subject. The survey
/// source is shared by all subjects and is returned unfiltered.
#[cfg_attr(test, mockall::automock)]
pub trait SourceLocator {
    /// Load one source for a subject, if it exists
    fn find(&self, subject: &SubjectId, kind: SourceKind) -> Result<Option<DataFrame>>;
}

/// Locates sources by file name in a single directory
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    raw_dir: PathBuf,
    survey_prefix: String,
    metrics: MetricsCollector,
}

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source)
        .map_err(|e| MergeError::InvalidConfig(format!("bad file pattern {source:?}: {e}")))
}

impl DirectoryLocator {
    /// Locator over `raw_dir`; the shared survey file starts with `survey_prefix`
    pub fn new(raw_dir: impl Into<PathBuf>, survey_prefix: impl Into<String>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            survey_prefix: survey_prefix.into(),
            metrics: MetricsCollector::default(),
        }
    }

    /// The directory searched
    #[must_use]
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// File names in the directory, sorted so selection is deterministic
    fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.raw_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn matcher(&self, subject: &SubjectId, kind: SourceKind) -> Result<Box<dyn Fn(&str) -> bool>> {
        let id = regex::escape(subject.as_str());
        let matcher: Box<dyn Fn(&str) -> bool> = match kind {
            SourceKind::Activity => {
                let re = pattern(&format!(r"^{id}\D.*Activity"))?;
                Box::new(move |name: &str| re.is_match(name))
            }
            SourceKind::Sleep => {
                let re = pattern(&format!(r"(?i)^{id}\D.*sleep"))?;
                Box::new(move |name: &str| re.is_match(name))
            }
            SourceKind::Sms => {
                let re = pattern(&format!(r"^sub-{id}_sms-times\.csv$"))?;
                Box::new(move |name: &str| re.is_match(name))
            }
            SourceKind::Survey => {
                let prefix = self.survey_prefix.clone();
                Box::new(move |name: &str| name.starts_with(&prefix))
            }
            SourceKind::Events(run) => {
                let re = pattern(&format!(
                    r"^sub-{id}_task-HealthMessage(?:Task)?_run-{}_events\.tsv$",
                    run.tag()
                ))?;
                Box::new(move |name: &str| re.is_match(name))
            }
        };
        Ok(matcher)
    }

    /// Path of the file backing a source, if any.
    ///
    /// With several candidates the first in sorted order wins and the
    /// ambiguity is logged.
    pub fn locate(&self, subject: &SubjectId, kind: SourceKind) -> Result<Option<PathBuf>> {
        let matcher = self.matcher(subject, kind)?;
        let candidates: Vec<String> = self
            .file_names()?
            .into_iter()
            .filter(|name| matcher(name.as_str()))
            .collect();

        let Some(chosen) = candidates.first() else {
            return Ok(None);
        };

        if candidates.len() > 1 {
            self.metrics.record_ambiguous_source(kind);
            let notice = MergeError::AmbiguousSource {
                kind: kind.to_string(),
                count: candidates.len(),
                chosen: chosen.clone(),
            };
            warn!(subject = %subject, "{notice}");
        }

        debug!(subject = %subject, kind = %kind, file = %chosen, "Located source");
        Ok(Some(self.raw_dir.join(chosen)))
    }

    /// Subject ids that appear in any activity, SMS or event file name,
    /// sorted numerically
    pub fn discover_subjects(&self) -> Result<Vec<SubjectId>> {
        let patterns = [
            pattern(r"^(\d+)\D.*Activity")?,
            pattern(r"^sub-(\d+)_sms-times\.csv$")?,
            pattern(r"^sub-(\d+)_task-HealthMessage")?,
        ];

        let mut found = BTreeSet::new();
        for name in self.file_names()? {
            for re in &patterns {
                if let Some(id) = re.captures(&name).and_then(|caps| caps.get(1)) {
                    let subject = SubjectId::new(id.as_str())?;
                    found.insert((subject.numeric(), subject));
                }
            }
        }

        Ok(found.into_iter().map(|(_, subject)| subject).collect())
    }
}

impl SourceLocator for DirectoryLocator {
    fn find(&self, subject: &SubjectId, kind: SourceKind) -> Result<Option<DataFrame>> {
        let Some(path) = self.locate(subject, kind)? else {
            return Ok(None);
        };
        let separator = match kind {
            SourceKind::Events(_) => b'\t',
            _ => b',',
        };
        read_path(&path, separator).map(Some)
    }
}

/// File name of a run's event log, as written by the task
#[must_use]
pub fn event_file_name(subject: &SubjectId, run: Run) -> String {
    format!("sub-{subject}_task-HealthMessage_run-{}_events.tsv", run.tag())
}
