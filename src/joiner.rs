//! Date-key joins.
//!
//! Builds the day table: activity ⟕ sleep ⟕ SMS ⟕ survey, all keyed on the
//! normalized date strings produced by the loader.

use polars::prelude::{DataFrame, JoinType};
use tracing::debug;

use crate::error::Result;
use crate::frame::{join, set_column, text_values, Cell};
use crate::loader::{SubjectSources, ACTIVITY_DATE, SLEEP_DATE, SMS_DATE, SURVEY_DATE};

/// Column flagging days on or after the subject's first SMS
pub const MESSAGE_START: &str = "msg_start";

/// Earliest valid SMS date, if any
#[must_use]
pub fn first_sms_date(sms: &DataFrame) -> Option<String> {
    text_values(sms, SMS_DATE)?
        .into_iter()
        .flatten()
        .min()
        .map(str::to_string)
}

/// `0` for days strictly before `first_sms`, `1` otherwise.
///
/// Days without a date, or subjects without any SMS date, get a missing
/// flag.
#[must_use]
pub fn message_start_flags(day: &DataFrame, first_sms: Option<&str>) -> Vec<Cell> {
    let dates = text_values(day, ACTIVITY_DATE).unwrap_or_else(|| vec![None; day.height()]);

    dates
        .into_iter()
        .map(|date| {
            let (date, first) = (date?, first_sms?);
            Some(if date < first { "0" } else { "1" }.to_string())
        })
        .collect()
}

/// Join the date-keyed sources into one row per activity day (more if a
/// later source has several rows for the same date).
///
/// Absent sources are skipped; collisions are suffixed `_x`/`_y`.
pub fn join_by_date(sources: &SubjectSources) -> Result<DataFrame> {
    let mut day = sources.activity.clone();

    if let Some(sleep) = &sources.sleep {
        day = join(&day, sleep, ACTIVITY_DATE, SLEEP_DATE, JoinType::Left)?;
    }

    if let Some(sms) = &sources.sms {
        day = join(&day, sms, ACTIVITY_DATE, SMS_DATE, JoinType::Left)?;
        let first = first_sms_date(sms);
        let flags = message_start_flags(&day, first.as_deref());
        set_column(&mut day, MESSAGE_START, flags)?;
    }

    if let Some(survey) = &sources.survey {
        day = join(&day, survey, ACTIVITY_DATE, SURVEY_DATE, JoinType::Left)?;
    }

    debug!(subject = %sources.subject, rows = day.height(), "Joined day table");
    Ok(day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{has_column, read_bytes};
    use crate::loader::{normalize_activity, normalize_sleep, normalize_sms};
    use crate::models::SubjectId;

    fn csv(data: &str) -> DataFrame {
        read_bytes(data.as_bytes(), b',').unwrap()
    }

    fn sources() -> SubjectSources {
        SubjectSources {
            subject: SubjectId::new("1011").unwrap(),
            activity: normalize_activity(csv(
                "ActivityDate,TotalSteps\n4/7/2020,100\n4/8/2020,200\n4/9/2020,300\n",
            ))
            .unwrap(),
            sleep: None,
            sms: None,
            survey: None,
            events: Vec::new(),
        }
    }

    #[test]
    fn test_activity_only_passes_through() {
        let day = join_by_date(&sources()).unwrap();
        assert_eq!(day.height(), 3);
        assert!(!has_column(&day, MESSAGE_START));
    }

    #[test]
    fn test_message_start_flags_follow_first_sms() {
        let mut sources = sources();
        sources.sms = Some(
            normalize_sms(csv(",timestamp\n0,2020-04-08 11:00:00\n1,2020-04-09 11:00:00\n")).unwrap(),
        );

        let day = join_by_date(&sources).unwrap();
        assert_eq!(
            text_values(&day, MESSAGE_START).unwrap(),
            vec![Some("0"), Some("1"), Some("1")]
        );
        assert_eq!(text_values(&day, "subj_day_num").unwrap(), vec![None, Some("1"), Some("2")]);
    }

    #[test]
    fn test_sleep_join_leaves_unmatched_days_missing() {
        let mut sources = sources();
        sources.sleep = Some(
            normalize_sleep(csv("SleepDay,TotalMinutesAsleep\n4/8/2020 12:00:00 AM,420\n")).unwrap(),
        );

        let day = join_by_date(&sources).unwrap();
        assert_eq!(
            text_values(&day, "TotalMinutesAsleep").unwrap(),
            vec![None, Some("420"), None]
        );
    }

    #[test]
    fn test_flags_missing_without_sms_dates() {
        let day = sources().activity;
        assert_eq!(message_start_flags(&day, None), vec![None, None, None]);
    }
}
