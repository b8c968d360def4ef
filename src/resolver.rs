//! Message identity resolution.
//!
//! Survey rows describe which message a subject received that day by
//! valence, category and number; the task event log identifies the same
//! message by a composite key. This module builds that key for the day
//! table and joins the day table with the event rows of both runs.

use std::fmt;
use std::str::FromStr;

use polars::prelude::{DataFrame, JoinType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MergeError, Result};
use crate::frame::{self, has_column, set_column, text_values, Cell};
use crate::models::Run;

/// Composite message key column added to the day table
pub const MESSAGE_KEY: &str = "msg_id";

/// Columns describing the message on both the survey and the event side
pub const MESSAGE_FIELDS: [&str; 3] = ["valence", "s_ns", "id"];

/// How the survey message number is turned into the key's numeric part.
///
/// The two generations of the merge script disagree: the earlier one used
/// the number as written, the later one read it as a float and dropped the
/// trailing `.0`. Which one matches a given event log depends on how the
/// survey export was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKeyStrategy {
    /// Use the message number text as-is
    #[default]
    Verbatim,
    /// Drop the last two characters (`12.0` -> `12`)
    StripFloatSuffix,
}

impl MessageKeyStrategy {
    /// The numeric part of the key for a raw message number
    #[must_use]
    pub fn message_number(self, raw: &str) -> String {
        let raw = raw.trim();
        match self {
            Self::Verbatim => raw.to_string(),
            Self::StripFloatSuffix => {
                let keep = raw.chars().count().saturating_sub(2);
                raw.chars().take(keep).collect()
            }
        }
    }
}

impl fmt::Display for MessageKeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verbatim => f.write_str("verbatim"),
            Self::StripFloatSuffix => f.write_str("strip_float_suffix"),
        }
    }
}

impl FromStr for MessageKeyStrategy {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "verbatim" => Ok(Self::Verbatim),
            "strip_float_suffix" => Ok(Self::StripFloatSuffix),
            other => Err(MergeError::InvalidConfig(format!(
                "unknown message key strategy {other:?} (expected verbatim or strip_float_suffix)"
            ))),
        }
    }
}

/// Build the key `{valence[..3]}_{category prefix}_{number}`.
///
/// The category prefix is 3 characters for `social`, 6 for `nonsocial`
/// (anything not starting with `s`), matching the ids the task writes.
#[must_use]
pub fn composite_key(valence: &str, category: &str, number: &str, strategy: MessageKeyStrategy) -> String {
    let valence_prefix: String = valence.chars().take(3).collect();
    let width = if category.starts_with('s') { 3 } else { 6 };
    let category_prefix: String = category.chars().take(width).collect();
    format!("{valence_prefix}_{category_prefix}_{}", strategy.message_number(number))
}

/// Add the composite key column to the day table.
///
/// Rows missing any of valence, category or number get a missing key.
pub fn add_message_keys(day: &mut DataFrame, strategy: MessageKeyStrategy) -> Result<()> {
    let keys: Vec<Cell> = {
        let frame: &DataFrame = day;
        let [valences, categories, numbers] =
            MESSAGE_FIELDS.map(|field| text_values(frame, field).unwrap_or_else(|| vec![None; frame.height()]));

        valences
            .into_iter()
            .zip(categories)
            .zip(numbers)
            .map(|((valence, category), number)| Some(composite_key(valence?, category?, number?, strategy)))
            .collect()
    };
    set_column(day, MESSAGE_KEY, keys)
}

/// Join the day table with the event rows of all available runs.
///
/// Matching rows are combined; day rows with no event and event rows with
/// no day are both kept with the other side missing. A message field that
/// both sides carry comes out as `<field>_x` (day) and `<field>_y` (event);
/// one carried by a single side keeps its name. Without any event table the
/// day table is returned with only the key column added.
pub fn resolve_events(
    mut day: DataFrame,
    events: &[(Run, DataFrame)],
    strategy: MessageKeyStrategy,
) -> Result<DataFrame> {
    add_message_keys(&mut day, strategy)?;

    if events.is_empty() {
        debug!(rows = day.height(), "No event data; keeping one row per day");
        return Ok(day);
    }

    let tables: Vec<DataFrame> = events.iter().map(|(_, table)| table.clone()).collect();
    let trials = frame::concat(&tables)?;
    if !has_column(&trials, "id") {
        return Err(MergeError::Schema("event log has no id column".to_string()));
    }

    let merged = frame::join(&day, &trials, MESSAGE_KEY, "id", JoinType::Outer)?;
    debug!(
        days = day.height(),
        events = trials.height(),
        rows = merged.height(),
        "Resolved events against day table"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{cell, read_bytes, set_constant_column};

    fn csv(data: &str) -> DataFrame {
        read_bytes(data.as_bytes(), b',').unwrap()
    }

    fn tagged(run: Run, data: &str) -> (Run, DataFrame) {
        let mut table = csv(data);
        set_constant_column(&mut table, "run", run.tag()).unwrap();
        (run, table)
    }

    #[test]
    fn test_composite_key_prefixes() {
        let verbatim = MessageKeyStrategy::Verbatim;
        assert_eq!(composite_key("positive", "social", "12", verbatim), "pos_soc_12");
        assert_eq!(composite_key("negative", "nonsocial", "3", verbatim), "neg_nonsoc_3");
    }

    #[test]
    fn test_strip_float_suffix() {
        let strip = MessageKeyStrategy::StripFloatSuffix;
        assert_eq!(composite_key("positive", "social", "12.0", strip), "pos_soc_12");
        assert_eq!(strip.message_number("7"), "");
    }

    #[test]
    fn test_strategy_parses_from_config_text() {
        assert_eq!("verbatim".parse::<MessageKeyStrategy>().unwrap(), MessageKeyStrategy::Verbatim);
        assert_eq!(
            "strip-float-suffix".parse::<MessageKeyStrategy>().unwrap(),
            MessageKeyStrategy::StripFloatSuffix
        );
        assert!("guess".parse::<MessageKeyStrategy>().is_err());
    }

    #[test]
    fn test_missing_fields_give_missing_key() {
        let mut day = csv("valence,s_ns,id\npositive,social,4\n,social,5\n");
        add_message_keys(&mut day, MessageKeyStrategy::Verbatim).unwrap();
        assert_eq!(text_values(&day, MESSAGE_KEY).unwrap(), vec![Some("pos_soc_4"), None]);
    }

    #[test]
    fn test_without_events_day_table_is_kept() {
        let day = csv("ActivityDate,valence,s_ns,id\n2020-04-08,positive,social,4\n");
        let resolved = resolve_events(day, &[], MessageKeyStrategy::Verbatim).unwrap();
        assert_eq!(resolved.height(), 1);
        assert!(has_column(&resolved, "valence"));
        assert_eq!(cell(&resolved, 0, MESSAGE_KEY), Some("pos_soc_4"));
    }

    #[test]
    fn test_events_join_on_key_across_runs() {
        let day = csv(
            "ActivityDate,valence,s_ns,id\n\
             2020-04-08,positive,social,4\n\
             2020-04-09,negative,nonsocial,9\n\
             2020-04-10,,,\n",
        );
        let events = [
            tagged(
                Run::One,
                "trial,onset,valence,s_ns,id\n1,0.5,positive,social,pos_soc_4\n2,8.0,negative,social,neg_soc_1\n",
            ),
            tagged(Run::Two, "trial,onset,valence,s_ns,id\n1,0.5,negative,nonsocial,neg_nonsoc_9\n"),
        ];

        let resolved = resolve_events(day, &events, MessageKeyStrategy::Verbatim).unwrap();
        // two matched days, one day without events, one event without a day
        assert_eq!(resolved.height(), 4);
        assert_eq!(cell(&resolved, 0, "run"), Some("01"));
        assert_eq!(cell(&resolved, 1, "run"), Some("02"));
        assert_eq!(cell(&resolved, 2, "ActivityDate"), Some("2020-04-10"));
        assert_eq!(cell(&resolved, 2, "run"), None);
        assert_eq!(cell(&resolved, 3, "id_y"), Some("neg_soc_1"));
        assert_eq!(cell(&resolved, 3, "ActivityDate"), None);
        assert_eq!(cell(&resolved, 0, "valence_x"), Some("positive"));
    }

    #[test]
    fn test_event_fields_keep_their_names_without_survey() {
        let day = csv("ActivityDate,TotalSteps\n2020-04-08,1000\n");
        let events = [tagged(Run::One, "trial,onset,valence,s_ns,id\n1,0.5,positive,social,pos_soc_4\n")];

        let resolved = resolve_events(day, &events, MessageKeyStrategy::Verbatim).unwrap();
        assert!(!has_column(&resolved, "valence_y"));
        assert_eq!(resolved.height(), 2);
        assert_eq!(cell(&resolved, 1, "valence"), Some("positive"));
        assert_eq!(cell(&resolved, 1, "s_ns"), Some("social"));
        assert_eq!(cell(&resolved, 1, "id"), Some("pos_soc_4"));
    }

    #[test]
    fn test_run_without_rows_contributes_nothing() {
        let day = csv("ActivityDate,valence,s_ns,id\n2020-04-08,positive,social,4\n");
        let events = [tagged(Run::Two, "trial,onset,valence,s_ns,id\n")];

        let resolved = resolve_events(day, &events, MessageKeyStrategy::Verbatim).unwrap();
        assert_eq!(resolved.height(), 1);
        assert_eq!(cell(&resolved, 0, "run"), None);
    }
}
