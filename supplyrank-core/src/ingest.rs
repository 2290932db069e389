//! Corpus loading from Parquet or CSV into a [`Frame`].

use std::path::Path;

use chrono::{DateTime, NaiveDate};
use polars::prelude::*;
use thiserror::Error;

use crate::error::SchemaError;
use crate::frame::{Frame, FrameError, Value};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported corpus format for {0} (expected .parquet or .csv)")]
    UnsupportedFormat(String),

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Reads training and candidate corpora.
#[derive(Debug, Clone, Default)]
pub struct CorpusReader {
    /// Column whose cells are embeddings; JSON array strings are parsed.
    vector_column: Option<String>,
}

impl CorpusReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector_column(mut self, column: impl Into<String>) -> Self {
        self.vector_column = Some(column.into());
        self
    }

    /// Load a `.parquet` or `.csv` file.
    pub fn read(&self, path: &Path) -> Result<Frame, IngestError> {
        let read_err = |e: PolarsError| IngestError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let lazy = match ext.as_deref() {
            Some("parquet") => LazyFrame::scan_parquet(path, Default::default()).map_err(read_err)?,
            Some("csv") => LazyCsvReader::new(path)
                .with_has_header(true)
                .finish()
                .map_err(read_err)?,
            _ => return Err(IngestError::UnsupportedFormat(path.display().to_string())),
        };
        let df = lazy.collect().map_err(read_err)?;

        let frame = self.convert_dataframe(&df)?;
        tracing::info!(
            path = %path.display(),
            rows = frame.height(),
            columns = frame.width(),
            "loaded corpus"
        );
        Ok(frame)
    }

    /// Convert a collected polars frame cell by cell.
    pub fn convert_dataframe(&self, df: &DataFrame) -> Result<Frame, IngestError> {
        let columns = df.get_columns();
        let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
        let mut rows: Vec<Vec<Value>> = (0..df.height())
            .map(|_| Vec::with_capacity(columns.len()))
            .collect();

        for (column, name) in columns.iter().zip(&names) {
            let is_vector = self.vector_column.as_deref() == Some(name.as_str());
            for (i, row) in rows.iter_mut().enumerate() {
                let cell = column.get(i).map_err(|e| IngestError::Read {
                    path: name.clone(),
                    reason: e.to_string(),
                })?;
                let value = convert(&cell, name)?;
                row.push(if is_vector { parse_vector(value, i, name)? } else { value });
            }
        }

        Ok(Frame::from_rows(names, rows)?)
    }
}

fn unsupported(column: &str, cell: &AnyValue) -> SchemaError {
    SchemaError::UnsupportedType {
        column: column.to_string(),
        dtype: cell.dtype().to_string(),
    }
}

fn convert(cell: &AnyValue, column: &str) -> Result<Value, SchemaError> {
    Ok(match cell {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::Int8(v) => Value::Int(i64::from(*v)),
        AnyValue::Int16(v) => Value::Int(i64::from(*v)),
        AnyValue::Int32(v) => Value::Int(i64::from(*v)),
        AnyValue::Int64(v) => Value::Int(*v),
        AnyValue::UInt8(v) => Value::Int(i64::from(*v)),
        AnyValue::UInt16(v) => Value::Int(i64::from(*v)),
        AnyValue::UInt32(v) => Value::Int(i64::from(*v)),
        AnyValue::UInt64(v) => i64::try_from(*v)
            .map(Value::Int)
            .unwrap_or(Value::Float(*v as f64)),
        AnyValue::Float32(v) => Value::Float(f64::from(*v)),
        AnyValue::Float64(v) => Value::Float(*v),
        AnyValue::String(s) => Value::Str((*s).to_string()),
        AnyValue::StringOwned(s) => Value::Str(s.to_string()),
        AnyValue::Date(days) => {
            let date = NaiveDate::from_num_days_from_ce_opt(719_163 + *days)
                .ok_or_else(|| unsupported(column, cell))?;
            Value::Date(date)
        }
        AnyValue::Datetime(v, unit, _) => {
            let micros = match unit {
                TimeUnit::Nanoseconds => v / 1_000,
                TimeUnit::Microseconds => *v,
                TimeUnit::Milliseconds => v * 1_000,
            };
            let date = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| unsupported(column, cell))?
                .date_naive();
            Value::Date(date)
        }
        AnyValue::List(series) => {
            let floats = series
                .cast(&DataType::Float64)
                .map_err(|_| unsupported(column, cell))?;
            let values = floats.f64().map_err(|_| unsupported(column, cell))?;
            Value::Vector(values.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect())
        }
        _ => return Err(unsupported(column, cell)),
    })
}

/// Embedding cells stored as JSON array strings, e.g. `"[0.12, -0.4]"`.
fn parse_vector(value: Value, row: usize, column: &str) -> Result<Value, SchemaError> {
    match value {
        Value::Str(raw) => serde_json::from_str::<Vec<f64>>(&raw)
            .map(Value::Vector)
            .map_err(|_| SchemaError::NotAVector {
                row,
                column: column.to_string(),
                found: "string",
            }),
        other => Ok(other),
    }
}
