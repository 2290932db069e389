//! Month bucket and composite region/classification key.

use chrono::{DateTime, Datelike, NaiveDate};

use crate::error::{FeatureError, SchemaError};
use crate::frame::{Frame, Value};

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.date_naive()))
        .or_else(|| {
            // "2023-04-01 12:30:00" and similar: take the date part.
            raw.get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        })
}

fn is_blank(cell: &Value) -> bool {
    cell.is_missing() || cell.as_str().is_some_and(|s| s.trim().is_empty())
}

/// Month (1-12) of every row's date cell. Missing or blank dates give Null.
pub fn months(frame: &Frame, column: &str) -> Result<Vec<Value>, FeatureError> {
    frame
        .column(column)?
        .into_iter()
        .enumerate()
        .map(|(row, cell)| {
            if is_blank(cell) {
                return Ok(Value::Null);
            }
            let date = match cell {
                Value::Date(d) => Some(*d),
                Value::Str(s) => parse_date(s),
                _ => None,
            };
            date.map(|d| Value::Int(d.month() as i64)).ok_or_else(|| {
                SchemaError::InvalidDate {
                    row,
                    column: column.to_string(),
                    value: cell.to_string(),
                }
                .into()
            })
        })
        .collect()
}

/// `"{region}_{okpd2}"` per row, optionally truncating the classification
/// code to its first `prefix` characters. Missing parts give a Null key.
pub fn composite_keys(
    frame: &Frame,
    region: &str,
    okpd2: &str,
    prefix: Option<usize>,
) -> Result<Vec<Value>, FeatureError> {
    let r = frame.require(region)?;
    let o = frame.require(okpd2)?;

    Ok(frame
        .rows()
        .iter()
        .map(|row| {
            if row[r].is_missing() || row[o].is_missing() {
                return Value::Null;
            }
            let code = row[o].to_string();
            let code = match prefix {
                Some(n) => code.chars().take(n).collect(),
                None => code,
            };
            Value::Str(format!("{}_{}", row[r], code))
        })
        .collect())
}
