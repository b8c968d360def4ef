//! Normalization and output shaping.
//!
//! Turns the resolved table into the fixed output schema: per-subject
//! z-scores, canonical column names, epoch timestamps, and the per-run and
//! combined projections.

use polars::prelude::{col, ChunkVar, DataFrame, DataType, IntoLazy, Series};
use tracing::debug;

use crate::dates::to_epoch_seconds;
use crate::error::Result;
use crate::frame::{
    self, has_column, map_column, rename_column, select_columns, set_column, set_constant_column, Cell, SortKey,
};
use crate::loader::{ACTIVITY_DATE, RUN};
use crate::models::{run_file_columns, Run, SubjectId, OUTPUT_COLUMNS};
use crate::resolver::MESSAGE_KEY;

/// Fields that get a `<field>_norm` z-score column
pub const NORMALIZED_FIELDS: [&str; 2] = ["TotalSteps", "RestingHeartRate"];

/// Population z-scores (`ddof = 0`); missing and non-numeric inputs give
/// `None`.
///
/// A field with no usable values, or with zero spread, yields all `None`.
pub fn z_scores(values: &Series) -> Result<Vec<Option<f64>>> {
    let numbers = values.cast(&DataType::Float64)?;
    let mean = numbers.mean();
    let numbers = numbers.f64()?;

    let spread = mean.zip(numbers.std(0)).filter(|(_, std_dev)| *std_dev > 0.0);
    let Some((mean, std_dev)) = spread else {
        return Ok(vec![None; numbers.len()]);
    };

    Ok(numbers
        .into_iter()
        .map(|x| x.map(|x| (x - mean) / std_dev).filter(|z| z.is_finite()))
        .collect())
}

/// Add `<field>_norm` for `field`; an absent field gives an all-missing column
pub fn normalize_field(table: &mut DataFrame, field: &str) -> Result<()> {
    let normalized: Vec<Cell> = match table.column(field) {
        Ok(values) => z_scores(values)?
            .into_iter()
            .map(|z| z.map(|z| z.to_string()))
            .collect(),
        Err(_) => vec![None; table.height()],
    };
    set_column(table, &format!("{field}_norm"), normalized)
}

/// Give merge-suffixed and source-specific columns their output names.
///
/// For a message field carried by both the day table and the events, the
/// day (`_x`) value wins and the event (`_y`) value fills the rows where
/// the day value is missing.
pub fn canonicalize_columns(table: &mut DataFrame) -> Result<()> {
    rename_column(table, MESSAGE_KEY, "msg_id_combined")?;
    rename_column(table, "unix_timestamp", "sms_timestamp")?;
    rename_column(table, "daily_survey_timestamp", "survey_complete_timestamp")?;

    for (base, canonical) in [("valence", "valence"), ("s_ns", "s_ns"), ("id", "msg_id")] {
        let (left, right) = (format!("{base}_x"), format!("{base}_y"));
        match (has_column(table, &left), has_column(table, &right)) {
            (true, true) => {
                let merged = table
                    .clone()
                    .lazy()
                    .with_columns([col(&left).fill_null(col(&right)).alias(canonical)])
                    .collect()?;
                *table = merged.drop(&left)?.drop(&right)?;
            }
            (true, false) => {
                rename_column(table, &left, canonical)?;
            }
            (false, true) => {
                rename_column(table, &right, canonical)?;
            }
            (false, false) => {
                if base != canonical {
                    rename_column(table, base, canonical)?;
                }
            }
        }
    }
    Ok(())
}

/// Shape a resolved table into the combined-output schema for one subject
pub fn finalize(mut table: DataFrame, subject: &SubjectId) -> Result<DataFrame> {
    for field in NORMALIZED_FIELDS {
        normalize_field(&mut table, field)?;
    }

    canonicalize_columns(&mut table)?;
    map_column(&mut table, "survey_complete_timestamp", |timestamp| {
        to_epoch_seconds(timestamp).map(|seconds| seconds.to_string())
    })?;
    set_constant_column(&mut table, "sub", &subject.numeric().to_string())?;

    let projected = select_columns(&table, &OUTPUT_COLUMNS)?;
    debug!(subject = %subject, rows = projected.height(), "Finalized subject table");
    Ok(projected)
}

/// One run's rows, sorted by trial then onset, in per-run file layout
pub fn run_table(subject_table: &DataFrame, run: Run) -> Result<DataFrame> {
    let rows = frame::filter_by(subject_table, RUN, |tag| tag == Some(run.tag()))?;
    let rows = frame::sort_by(rows, &[SortKey::Numeric("trial"), SortKey::Numeric("onset")])?;
    select_columns(&rows, &run_file_columns())
}

/// Stack subject tables and sort by subject then date
pub fn combine(subject_tables: &[DataFrame]) -> Result<DataFrame> {
    let combined = frame::concat(subject_tables)?;
    frame::sort_by(combined, &[SortKey::Numeric("sub"), SortKey::Text(ACTIVITY_DATE)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{cell, read_bytes, text_values};
    use proptest::prelude::*;
    use polars::prelude::NamedFrom;

    fn csv(data: &str) -> DataFrame {
        read_bytes(data.as_bytes(), b',').unwrap()
    }

    fn text(values: &[Option<&str>]) -> Series {
        Series::new("values", values)
    }

    #[test]
    fn test_z_scores_population() {
        let z = z_scores(&text(&[Some("1000"), Some("2000"), Some("3000")])).unwrap();
        let expected = 1.224_744_871_391_589;
        assert!((z[0].unwrap() + expected).abs() < 1e-12);
        assert!(z[1].unwrap().abs() < 1e-12);
        assert!((z[2].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_z_scores_all_missing() {
        let z = z_scores(&text(&[None, Some("abc")])).unwrap();
        assert_eq!(z, vec![None, None]);
    }

    #[test]
    fn test_z_scores_zero_spread() {
        let z = z_scores(&text(&[Some("5"), Some("5")])).unwrap();
        assert_eq!(z, vec![None, None]);
    }

    #[test]
    fn test_z_scores_skip_missing_entries() {
        let z = z_scores(&text(&[Some("10"), None, Some("20")])).unwrap();
        assert!((z[0].unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(z[1], None);
        assert!((z[2].unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_absent_field_is_missing() {
        let mut table = csv("TotalSteps\n1\n2\n");
        normalize_field(&mut table, "RestingHeartRate").unwrap();
        assert_eq!(text_values(&table, "RestingHeartRate_norm").unwrap(), vec![None, None]);
    }

    #[test]
    fn test_canonicalize_prefers_left_message_fields() {
        let mut table = csv(
            "msg_id,valence_x,valence_y,s_ns_x,s_ns_y,id_x,id_y,unix_timestamp\n\
             k,positive,negative,social,nonsocial,4,pos_soc_4,1\n\
             ,,negative,,social,,neg_soc_7,\n",
        );
        canonicalize_columns(&mut table).unwrap();
        assert!(!has_column(&table, "valence_x"));
        assert!(!has_column(&table, "id_y"));
        assert_eq!(cell(&table, 0, "msg_id_combined"), Some("k"));
        assert_eq!(cell(&table, 0, "valence"), Some("positive"));
        assert_eq!(cell(&table, 0, "s_ns"), Some("social"));
        assert_eq!(cell(&table, 0, "msg_id"), Some("4"));
        assert_eq!(cell(&table, 0, "sms_timestamp"), Some("1"));

        assert_eq!(cell(&table, 1, "valence"), Some("negative"));
        assert_eq!(cell(&table, 1, "s_ns"), Some("social"));
        assert_eq!(cell(&table, 1, "msg_id"), Some("neg_soc_7"));
    }

    #[test]
    fn test_canonicalize_keeps_single_sided_fields() {
        let mut table = csv("valence,s_ns,id\npositive,social,pos_soc_4\n");
        canonicalize_columns(&mut table).unwrap();
        assert_eq!(cell(&table, 0, "valence"), Some("positive"));
        assert_eq!(cell(&table, 0, "s_ns"), Some("social"));
        assert_eq!(cell(&table, 0, "msg_id"), Some("pos_soc_4"));
    }

    #[test]
    fn test_finalize_projects_full_schema() {
        let table = csv("ActivityDate,TotalSteps,daily_survey_timestamp\n2020-04-08,100,1970-01-02 00:00:00\n");
        let subject = SubjectId::new("0071").unwrap();
        let finalized = finalize(table, &subject).unwrap();

        assert_eq!(finalized.width(), OUTPUT_COLUMNS.len());
        assert_eq!(cell(&finalized, 0, "sub"), Some("71"));
        assert_eq!(cell(&finalized, 0, "survey_complete_timestamp"), Some("86400"));
        // single value has zero spread
        assert_eq!(cell(&finalized, 0, "TotalSteps_norm"), None);
        assert_eq!(cell(&finalized, 0, "TotalMinutesREM"), None);
    }

    #[test]
    fn test_run_table_filters_and_sorts() {
        let table = csv("sub,run,trial,onset,ActivityDate\n1,02,1,0.5,d\n1,01,2,9.0,d\n1,01,1,4.0,d\n1,01,1,1.0,d\n");
        let run_one = run_table(&table, Run::One).unwrap();

        assert_eq!(run_one.height(), 3);
        assert_eq!(run_one.get_column_names()[0], "onset");
        assert!(!has_column(&run_one, "ActivityDate"));
        assert_eq!(
            text_values(&run_one, "onset").unwrap(),
            vec![Some("1.0"), Some("4.0"), Some("9.0")]
        );
    }

    #[test]
    fn test_combine_sorts_by_subject_then_date() {
        let later = csv("sub,ActivityDate\n1105,2020-04-09\n1105,2020-04-08\n");
        let earlier = csv("sub,ActivityDate\n1011,2020-05-01\n");

        let combined = combine(&[later, earlier]).unwrap();
        assert_eq!(
            text_values(&combined, "sub").unwrap(),
            vec![Some("1011"), Some("1105"), Some("1105")]
        );
        assert_eq!(cell(&combined, 1, "ActivityDate"), Some("2020-04-08"));
    }

    proptest! {
        #[test]
        fn z_scores_have_zero_mean_unit_spread(values in prop::collection::vec(0u32..100_000, 2..50)) {
            prop_assume!(values.iter().any(|v| *v != values[0]));
            let text: Vec<String> = values.iter().map(ToString::to_string).collect();
            let z: Vec<f64> = z_scores(&Series::new("steps", text)).unwrap().into_iter().flatten().collect();

            let n = z.len() as f64;
            let mean = z.iter().sum::<f64>() / n;
            let std_dev = (z.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
            prop_assert_eq!(z.len(), values.len());
            prop_assert!(mean.abs() < 1e-9);
            prop_assert!((std_dev - 1.0).abs() < 1e-9);
        }
    }
}
