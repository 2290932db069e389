//! Row deduplication and key membership on polars.
//!
//! Frame cells are projected into a polars `DataFrame` next to a row-position
//! column. Polars decides which rows survive and the frame keeps its own
//! cells for those positions, so no value is rewritten by the round trip.

use std::collections::HashSet;

use chrono::Datelike;
use polars::prelude::*;

use crate::frame::{Frame, Value};

const ROW: &str = "__row";

/// Polars dtype a run of cells is keyed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Bool,
    Int,
    Float,
    Str,
    Date,
    /// Vectors and mixed columns: kind-tagged display text.
    Tagged,
}

fn key_kind<'a>(cells: impl IntoIterator<Item = &'a Value>) -> KeyKind {
    let kinds: HashSet<&'static str> = cells
        .into_iter()
        .filter(|v| !v.is_null())
        .map(Value::kind)
        .collect();
    if kinds.len() != 1 {
        return KeyKind::Tagged;
    }
    match kinds.into_iter().next() {
        Some("bool") => KeyKind::Bool,
        Some("int") => KeyKind::Int,
        Some("float") => KeyKind::Float,
        Some("string") => KeyKind::Str,
        Some("date") => KeyKind::Date,
        _ => KeyKind::Tagged,
    }
}

fn key_column(name: &str, cells: &[&Value], kind: KeyKind) -> Column {
    let name: PlSmallStr = name.into();
    match kind {
        KeyKind::Bool => Column::new(
            name,
            cells
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        KeyKind::Int => Column::new(
            name,
            cells
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        KeyKind::Float => Column::new(
            name,
            cells
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        KeyKind::Str => Column::new(
            name,
            cells.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
        ),
        KeyKind::Date => Column::new(
            name,
            cells
                .iter()
                .map(|v| match v {
                    Value::Date(d) => Some(d.num_days_from_ce()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        KeyKind::Tagged => Column::new(
            name,
            cells
                .iter()
                .map(|v| (!v.is_null()).then(|| format!("{}:{}", v.kind(), v)))
                .collect::<Vec<_>>(),
        ),
    }
}

fn row_positions(n: usize) -> Column {
    Column::new(ROW.into(), (0..n as u32).collect::<Vec<u32>>())
}

fn surviving_rows(df: &DataFrame) -> PolarsResult<Vec<usize>> {
    Ok(df
        .column(ROW)?
        .as_materialized_series()
        .u32()?
        .into_no_null_iter()
        .map(|i| i as usize)
        .collect())
}

/// Positions of the first occurrence of every distinct row, in row order.
pub fn unique_rows(frame: &Frame) -> PolarsResult<Vec<usize>> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    if frame.width() == 0 {
        return Ok(vec![0]);
    }

    let names: Vec<String> = (0..frame.width()).map(|c| format!("c{c}")).collect();
    let mut columns: Vec<Column> = names
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let cells: Vec<&Value> = frame.rows().iter().map(|r| &r[c]).collect();
            key_column(name, &cells, key_kind(cells.iter().copied()))
        })
        .collect();
    columns.push(row_positions(frame.height()));

    let unique = DataFrame::new(columns)?
        .lazy()
        .unique_stable(
            Some(names.iter().map(|n| n.as_str().into()).collect()),
            UniqueKeepStrategy::First,
        )
        .collect()?;
    surviving_rows(&unique)
}

/// Positions of `cells` that are (`keep_members`) or are not in `keys`, in
/// row order. A Null cell matches a Null key.
pub fn member_rows(
    cells: &[&Value],
    keys: &HashSet<Value>,
    keep_members: bool,
) -> PolarsResult<Vec<usize>> {
    if cells.is_empty() {
        return Ok(Vec::new());
    }

    let key_cells: Vec<&Value> = keys.iter().filter(|k| !k.is_null()).collect();
    let kind = key_kind(cells.iter().copied().chain(key_cells.iter().copied()));
    let key_list = key_column("key", &key_cells, kind);

    let mut hit = col("key")
        .is_in(lit(key_list.as_materialized_series().clone()))
        .fill_null(lit(false));
    if keys.contains(&Value::Null) {
        hit = hit.or(col("key").is_null());
    }
    let predicate = if keep_members { hit } else { hit.not() };

    let kept = DataFrame::new(vec![key_column("key", cells, kind), row_positions(cells.len())])?
        .lazy()
        .filter(predicate)
        .collect()?;
    surviving_rows(&kept)
}
