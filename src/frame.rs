//! Text-typed polars frames.
//!
//! Sources are read with every column as UTF-8 so cells keep the spelling
//! of the export; stages cast to numbers only where they compute. A null
//! cell is a missing value and is written out as [`MISSING_MARKER`].

use std::io::{Cursor, Write};
use std::path::Path;

use polars::prelude::*;

use crate::error::Result;

/// How a missing cell is written in CSV output
pub const MISSING_MARKER: &str = "NA";

/// Cell spellings read as missing, in addition to empty fields
const NULL_SPELLINGS: [&str; 5] = ["NA", "N/A", "NaN", "nan", "null"];

const JOIN_KEY: &str = "__join_key";
const LEFT_ORDER: &str = "__left_order";
const RIGHT_ORDER: &str = "__right_order";

/// One owned text cell; `None` is missing
pub type Cell = Option<String>;

/// Sort key for [`sort_by`]
#[derive(Debug, Clone, Copy)]
pub enum SortKey<'a> {
    /// Compare as numbers; unparseable cells sort with the missing ones
    Numeric(&'a str),
    /// Compare as text
    Text(&'a str),
}

fn null_values() -> Option<NullValues> {
    Some(NullValues::AllColumns(
        NULL_SPELLINGS.iter().map(|spelling| (*spelling).to_string()).collect(),
    ))
}

/// Read delimited text with a header row, all columns as text
pub fn read_bytes(data: &[u8], separator: u8) -> Result<DataFrame> {
    let frame = CsvReader::new(Cursor::new(data))
        .has_header(true)
        .with_separator(separator)
        .infer_schema(Some(0))
        .with_null_values(null_values())
        .finish()?;
    Ok(frame)
}

/// Read a delimited file with a header row, all columns as text
pub fn read_path(path: &Path, separator: u8) -> Result<DataFrame> {
    let frame = CsvReader::from_path(path)?
        .has_header(true)
        .with_separator(separator)
        .infer_schema(Some(0))
        .with_null_values(null_values())
        .finish()?;
    Ok(frame)
}

/// Whether `frame` has a column called `name`
#[must_use]
pub fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.get_column_names().contains(&name)
}

/// A text column's cells, or `None` if the column is absent
#[must_use]
pub fn text_values<'a>(frame: &'a DataFrame, name: &str) -> Option<Vec<Option<&'a str>>> {
    let values = frame.column(name).ok()?.utf8().ok()?;
    Some(values.into_iter().collect())
}

/// One text cell; `None` when missing or when the column is absent
#[must_use]
pub fn cell<'a>(frame: &'a DataFrame, row: usize, name: &str) -> Option<&'a str> {
    frame.column(name).ok()?.utf8().ok()?.get(row)
}

/// Add or replace a text column
pub fn set_column(frame: &mut DataFrame, name: &str, values: Vec<Cell>) -> Result<()> {
    frame.with_column(Series::new(name, values))?;
    Ok(())
}

/// Add or replace a column holding `value` on every row
pub fn set_constant_column(frame: &mut DataFrame, name: &str, value: &str) -> Result<()> {
    let values = vec![value; frame.height()];
    frame.with_column(Series::new(name, values))?;
    Ok(())
}

/// Rewrite a text column cell by cell; returns false if it is absent
pub fn map_column<F>(frame: &mut DataFrame, name: &str, f: F) -> Result<bool>
where
    F: FnMut(Option<&str>) -> Cell,
{
    let Some(values) = text_values(frame, name) else {
        return Ok(false);
    };
    let mapped: Vec<Cell> = values.into_iter().map(f).collect();
    set_column(frame, name, mapped)?;
    Ok(true)
}

/// Rename a column if present; returns whether it was
pub fn rename_column(frame: &mut DataFrame, from: &str, to: &str) -> Result<bool> {
    if !has_column(frame, from) {
        return Ok(false);
    }
    frame.rename(from, to)?;
    Ok(true)
}

/// Rows whose `name` cell satisfies `keep`; an absent column reads as missing
pub fn filter_by<F>(frame: &DataFrame, name: &str, keep: F) -> Result<DataFrame>
where
    F: Fn(Option<&str>) -> bool,
{
    let mask: BooleanChunked = match text_values(frame, name) {
        Some(values) => values.into_iter().map(|value| Some(keep(value))).collect(),
        None => (0..frame.height()).map(|_| Some(keep(None))).collect(),
    };
    Ok(frame.filter(&mask)?)
}

/// Project onto `columns` in order, as text; absent columns are all missing
pub fn select_columns<S: AsRef<str>>(frame: &DataFrame, columns: &[S]) -> Result<DataFrame> {
    let height = frame.height();
    let series = columns
        .iter()
        .map(|name| {
            let name = name.as_ref();
            match frame.column(name) {
                Ok(values) => values.cast(&DataType::Utf8),
                Err(_) => Ok(Series::full_null(name, height, &DataType::Utf8)),
            }
        })
        .collect::<PolarsResult<Vec<_>>>()?;
    Ok(DataFrame::new(series)?)
}

/// Stack frames vertically over the union of their columns, in first-seen
/// order
pub fn concat(frames: &[DataFrame]) -> Result<DataFrame> {
    let mut columns: Vec<String> = Vec::new();
    for frame in frames {
        for name in frame.get_column_names() {
            if !columns.iter().any(|seen| seen == name) {
                columns.push(name.to_string());
            }
        }
    }

    let mut stacked: Option<DataFrame> = None;
    for frame in frames {
        let aligned = select_columns(frame, &columns)?;
        stacked = Some(match stacked {
            Some(mut acc) => {
                acc.vstack_mut(&aligned)?;
                acc
            }
            None => aligned,
        });
    }
    Ok(stacked.unwrap_or_default())
}

fn order_column(name: &str, height: usize) -> Series {
    #[allow(clippy::cast_possible_truncation)]
    let positions: Vec<u32> = (0..height).map(|position| position as u32).collect();
    Series::new(name, positions)
}

fn with_join_columns(frame: &DataFrame, key: &str, order: &str) -> Result<DataFrame> {
    let mut prepared = frame.clone();
    let mut join_key = frame.column(key)?.cast(&DataType::Utf8)?;
    join_key.rename(JOIN_KEY);
    prepared.with_column(join_key)?;
    prepared.with_column(order_column(order, frame.height()))?;
    Ok(prepared)
}

/// Join `left.left_key = right.right_key`.
///
/// Columns present on both sides are renamed `<name>_x` (left) and
/// `<name>_y` (right); other names are kept. Both key columns stay in the
/// result as ordinary columns. Missing keys never match. Rows come out in
/// left order with matches in right order; for an outer join the unmatched
/// right rows follow, in right order.
pub fn join(
    left: &DataFrame,
    right: &DataFrame,
    left_key: &str,
    right_key: &str,
    how: JoinType,
) -> Result<DataFrame> {
    let mut left = with_join_columns(left, left_key, LEFT_ORDER)?;
    let mut right = with_join_columns(right, right_key, RIGHT_ORDER)?;

    let right_names: Vec<String> = right.get_column_names().iter().map(ToString::to_string).collect();
    let collisions: Vec<String> = left
        .get_column_names()
        .into_iter()
        .filter(|name| *name != JOIN_KEY && right_names.iter().any(|other| other == name))
        .map(str::to_string)
        .collect();
    for name in &collisions {
        left.rename(name, &format!("{name}_x"))?;
        right.rename(name, &format!("{name}_y"))?;
    }

    let joined = left.join(&right, [JOIN_KEY], [JOIN_KEY], JoinArgs::new(how))?;
    let ordered = joined
        .lazy()
        .sort_by_exprs([col(LEFT_ORDER), col(RIGHT_ORDER)], [false, false], true, true)
        .collect()?;

    let kept: Vec<String> = ordered
        .get_column_names()
        .into_iter()
        .filter(|name| !name.starts_with("__"))
        .map(str::to_string)
        .collect();
    Ok(ordered.select(kept)?)
}

/// Stable sort on `keys`, missing cells last. Keys naming absent columns are
/// ignored.
pub fn sort_by(frame: DataFrame, keys: &[SortKey<'_>]) -> Result<DataFrame> {
    let exprs: Vec<Expr> = keys
        .iter()
        .filter_map(|key| match *key {
            SortKey::Numeric(name) => has_column(&frame, name).then(|| col(name).cast(DataType::Float64)),
            SortKey::Text(name) => has_column(&frame, name).then(|| col(name)),
        })
        .collect();
    if exprs.is_empty() {
        return Ok(frame);
    }

    let descending = vec![false; exprs.len()];
    Ok(frame.lazy().sort_by_exprs(exprs, descending, true, true).collect()?)
}

/// Write as comma-separated text with a header row; missing cells are
/// written as [`MISSING_MARKER`]
pub fn write_csv<W: Write>(frame: &DataFrame, writer: W) -> Result<()> {
    let mut out = ::csv::Writer::from_writer(writer);
    out.write_record(frame.get_column_names())?;

    let columns = frame
        .get_columns()
        .iter()
        .map(|values| values.cast(&DataType::Utf8))
        .collect::<PolarsResult<Vec<_>>>()?;
    let texts = columns
        .iter()
        .map(Series::utf8)
        .collect::<PolarsResult<Vec<_>>>()?;

    for row in 0..frame.height() {
        out.write_record(texts.iter().map(|values| values.get(row).unwrap_or(MISSING_MARKER)))?;
    }
    out.flush()?;
    Ok(())
}
