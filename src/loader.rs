//! Per-source loading and normalization.
//!
//! Each source is reduced to a table carrying a `YYYY-MM-DD` date key that
//! the date joiner can match on: `ActivityDate`, `SleepDate`, `SmsDate` and
//! `SurveyDate`. Event tables are tagged with their run.

use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use crate::dates::{format_date, safe_extract_date};
use crate::error::{MergeError, Result};
use crate::frame::{self, has_column, map_column, rename_column, set_column, set_constant_column, text_values, Cell};
use crate::locator::SourceLocator;
use crate::metrics::MetricsCollector;
use crate::models::{Run, SourceKind, SubjectId};

/// Normalized activity date key (`YYYY-MM-DD`)
pub const ACTIVITY_DATE: &str = "ActivityDate";
/// Sleep date key derived from `SleepDay`
pub const SLEEP_DATE: &str = "SleepDate";
/// SMS date key derived from the send timestamp
pub const SMS_DATE: &str = "SmsDate";
/// Survey date key derived from the completion timestamp
pub const SURVEY_DATE: &str = "SurveyDate";
/// 1-based study day number from the SMS log
pub const DAY_NUMBER: &str = "subj_day_num";
/// Run tag (`01`, `02`) carried by event rows
pub const RUN: &str = "run";

/// Every source found for one subject, normalized
#[derive(Debug, Clone)]
pub struct SubjectSources {
    /// Subject the sources belong to
    pub subject: SubjectId,
    /// Daily activity, keyed by `ActivityDate`
    pub activity: DataFrame,
    /// Sleep summary keyed by `SleepDate`, if present and usable
    pub sleep: Option<DataFrame>,
    /// SMS send log keyed by `SmsDate`, if present and usable
    pub sms: Option<DataFrame>,
    /// This subject's survey rows keyed by `SurveyDate`, if any
    pub survey: Option<DataFrame>,
    /// Event tables for the runs that exist, in run order
    pub events: Vec<(Run, DataFrame)>,
}

/// Rewrite `ActivityDate` from `M/D/YYYY` to `YYYY-MM-DD`.
///
/// Unparseable dates become missing rather than failing the subject.
pub fn normalize_activity(mut activity: DataFrame) -> Result<DataFrame> {
    if !has_column(&activity, ACTIVITY_DATE) {
        return Err(MergeError::Schema(format!("activity table has no {ACTIVITY_DATE} column")));
    }

    map_column(&mut activity, ACTIVITY_DATE, |raw| {
        let raw = raw?;
        match format_date(raw) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(value = raw, "Dropping activity date: {e}");
                None
            }
        }
    })?;

    let dates = activity.column(ACTIVITY_DATE)?;
    let present = dates.len() - dates.null_count();
    let distinct = dates.drop_nulls().n_unique()?;
    if distinct < present {
        warn!(duplicates = present - distinct, "Activity export has more than one row for a day");
    }

    Ok(activity)
}

/// Derive `SleepDate` from the `SleepDay` timestamp (`M/D/YYYY h:mm:ss AM`)
pub fn normalize_sleep(mut sleep: DataFrame) -> Result<DataFrame> {
    let dates: Vec<Cell> = text_values(&sleep, "SleepDay")
        .ok_or_else(|| MergeError::Schema("sleep table has no SleepDay column".to_string()))?
        .into_iter()
        .map(|day| {
            let date = day?.split_whitespace().next()?;
            format_date(date).ok()
        })
        .collect();

    set_column(&mut sleep, SLEEP_DATE, dates)?;
    Ok(sleep)
}

/// True for the name a reader gives a header cell left blank
fn is_unlabeled(name: &str) -> bool {
    name.is_empty() || name == "column_1" || name.starts_with("Unnamed")
}

/// Number the SMS days from 1 and derive `SmsDate` from `timestamp`.
///
/// The export's leading column is an unlabeled 0-based ordinal. When it is
/// absent or not an integer, the row position is used instead.
pub fn normalize_sms(mut sms: DataFrame) -> Result<DataFrame> {
    let dates: Vec<Cell> = text_values(&sms, "timestamp")
        .ok_or_else(|| MergeError::Schema("SMS table has no timestamp column".to_string()))?
        .into_iter()
        .map(safe_extract_date)
        .collect();

    let leading = sms.get_column_names().first().map(|name| (*name).to_string());
    if let Some(leading) = leading.filter(|name| is_unlabeled(name)) {
        rename_column(&mut sms, &leading, DAY_NUMBER)?;
    }

    let day_numbers: Vec<Cell> = text_values(&sms, DAY_NUMBER)
        .unwrap_or_else(|| vec![None; sms.height()])
        .into_iter()
        .enumerate()
        .map(|(position, ordinal)| {
            let zero_based = ordinal
                .and_then(|text| text.trim().parse::<u64>().ok())
                .unwrap_or(position as u64);
            Some((zero_based + 1).to_string())
        })
        .collect();

    set_column(&mut sms, DAY_NUMBER, day_numbers)?;
    set_column(&mut sms, SMS_DATE, dates)?;
    Ok(sms)
}

/// Keep this subject's survey rows and derive `SurveyDate`
pub fn filter_survey(survey: &DataFrame, subject: &SubjectId) -> Result<DataFrame> {
    if !has_column(survey, "subject_id") {
        return Err(MergeError::Schema("survey table has no subject_id column".to_string()));
    }

    let mut rows = frame::filter_by(survey, "subject_id", |id| id.is_some_and(|id| subject.matches(id)))?;
    let dates: Vec<Cell> = text_values(&rows, "daily_survey_timestamp")
        .unwrap_or_else(|| vec![None; rows.height()])
        .into_iter()
        .map(safe_extract_date)
        .collect();
    set_column(&mut rows, SURVEY_DATE, dates)?;
    Ok(rows)
}

/// Check a run's event log and tag its rows with the run.
///
/// An event log without an `id` column cannot be matched to any message.
pub fn tag_events(mut events: DataFrame, run: Run) -> Result<DataFrame> {
    if !has_column(&events, "id") {
        return Err(MergeError::Schema(format!("run-{run} event log has no id column")));
    }
    set_constant_column(&mut events, RUN, run.tag())?;
    Ok(events)
}

/// Look up and normalize an optional source.
///
/// Absent, unreadable and unusable sources all come back as `None`; only
/// the log level differs.
fn optional_source<L, F>(
    locator: &L,
    subject: &SubjectId,
    kind: SourceKind,
    metrics: &MetricsCollector,
    normalize: F,
) -> Option<DataFrame>
where
    L: SourceLocator + ?Sized,
    F: FnOnce(DataFrame) -> Result<DataFrame>,
{
    let found = match locator.find(subject, kind) {
        Ok(found) => found,
        Err(e) => {
            metrics.record_missing_source(kind);
            warn!(subject = %subject, kind = %kind, "Ignoring unreadable source: {e}");
            return None;
        }
    };

    let Some(table) = found else {
        metrics.record_missing_source(kind);
        let notice = MergeError::MissingOptionalSource {
            subject: subject.to_string(),
            kind: kind.to_string(),
        };
        info!("{notice}");
        return None;
    };

    match normalize(table) {
        Ok(table) => {
            debug!(subject = %subject, kind = %kind, rows = table.height(), "Loaded source");
            Some(table)
        }
        Err(e) => {
            metrics.record_missing_source(kind);
            warn!(subject = %subject, kind = %kind, "Ignoring unusable source: {e}");
            None
        }
    }
}

/// Load and normalize every source for a subject.
///
/// Fails with `MissingRequiredSource` when there is no activity export, and
/// with the underlying error when the activity export cannot be read.
/// Optional sources that are absent, unreadable or unusable are logged and
/// skipped.
pub fn load_subject<L>(locator: &L, subject: &SubjectId, metrics: &MetricsCollector) -> Result<SubjectSources>
where
    L: SourceLocator + ?Sized,
{
    let activity = locator
        .find(subject, SourceKind::Activity)?
        .ok_or_else(|| MergeError::MissingRequiredSource {
            subject: subject.to_string(),
            kind: SourceKind::Activity.to_string(),
        })?;
    let activity = normalize_activity(activity)?;

    let sleep = optional_source(locator, subject, SourceKind::Sleep, metrics, normalize_sleep);
    let sms = optional_source(locator, subject, SourceKind::Sms, metrics, normalize_sms);
    let survey = optional_source(locator, subject, SourceKind::Survey, metrics, |survey| {
        filter_survey(&survey, subject)
    });

    let events = Run::ALL
        .into_iter()
        .filter_map(|run| {
            optional_source(locator, subject, SourceKind::Events(run), metrics, |events| {
                tag_events(events, run)
            })
            .map(|events| (run, events))
        })
        .collect();

    Ok(SubjectSources {
        subject: subject.clone(),
        activity,
        sleep,
        sms,
        survey,
        events,
    })
}
