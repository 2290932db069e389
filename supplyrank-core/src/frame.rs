//! In-memory purchase table.
//!
//! A `Frame` is an ordered collection of rows with named columns and an
//! optional named index. Every operation returns a new `Frame`; inputs are
//! never mutated, so a corpus can be shared read-only between pipeline stages.
//!
//! Cell equality and hashing are bitwise for floats. Two rows that both hold
//! `NaN` in the same column compare equal, which is what group keys need.
//! Row deduplication and key filtering run on polars; see
//! [`crate::canonicalize`].

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Cells ───────────────────────────────────────────────────────────

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    Vector(Vec<f64>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or NaN: the cell carries no observation.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Vector(_) => "vector",
        }
    }

    /// Parse a scalar from user input: integer if it parses as one, string otherwise.
    pub fn parse_scalar(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Str(raw.trim().to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Vector(v) => {
                v.len().hash(state);
                for x in v {
                    x.to_bits().hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("column `{0}` not found")]
    MissingColumn(String),

    #[error("column `{0}` appears more than once")]
    DuplicateColumn(String),

    #[error("row has {actual} cells, frame has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("column `{column}` has {actual} values, frame has {expected} rows")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("frame has no index")]
    NoIndex,
}

// ─── Frame ───────────────────────────────────────────────────────────

/// Ordered table of rows with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Name of the index column once `set_index` has been applied.
    index_name: Option<String>,
    /// One index value per row; empty when there is no index.
    index: Vec<Value>,
}

impl Frame {
    /// Create an empty frame with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self, FrameError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(FrameError::DuplicateColumn(c.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
            index_name: None,
            index: Vec::new(),
        })
    }

    /// Build a frame from column names and rows.
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, FrameError> {
        let mut frame = Self::new(columns)?;
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Append a row. Only valid on frames without an index.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), FrameError> {
        if row.len() != self.columns.len() {
            return Err(FrameError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require(&self, name: &str) -> Result<usize, FrameError> {
        self.position(name)
            .ok_or_else(|| FrameError::MissingColumn(name.to_string()))
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, FrameError> {
        let pos = self.require(name)?;
        Ok(self.rows.iter().map(|r| &r[pos]).collect())
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    /// Index values, one per row. Empty when the frame has no index.
    pub fn index(&self) -> &[Value] {
        &self.index
    }

    /// Add a column at the end, or replace an existing column of the same name.
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> Result<Frame, FrameError> {
        if values.len() != self.rows.len() {
            return Err(FrameError::ColumnLength {
                column: name.to_string(),
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        let mut out = self.clone();
        match out.position(name) {
            Some(pos) => {
                for (row, v) in out.rows.iter_mut().zip(values) {
                    row[pos] = v;
                }
            }
            None => {
                out.columns.push(name.to_string());
                for (row, v) in out.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(out)
    }

    /// Drop the named columns. Every name must exist.
    pub fn drop_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Frame, FrameError> {
        let mut drop = HashSet::new();
        for n in names {
            drop.insert(self.require(n.as_ref())?);
        }
        let keep: Vec<usize> = (0..self.columns.len()).filter(|i| !drop.contains(i)).collect();
        Ok(Frame {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| keep.iter().map(|&i| r[i].clone()).collect())
                .collect(),
            index_name: self.index_name.clone(),
            index: self.index.clone(),
        })
    }

    /// Keep rows for which `keep(row_position)` is true.
    pub fn filter<F>(&self, mut keep: F) -> Frame
    where
        F: FnMut(usize) -> bool,
    {
        let positions: Vec<usize> = (0..self.rows.len()).filter(|&i| keep(i)).collect();
        self.take(&positions)
    }

    /// Select rows by position, in the given order.
    pub fn take(&self, positions: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: positions.iter().map(|&i| self.rows[i].clone()).collect(),
            index_name: self.index_name.clone(),
            index: if self.index.is_empty() {
                Vec::new()
            } else {
                positions.iter().map(|&i| self.index[i].clone()).collect()
            },
        }
    }

    /// Move a column into the index. Replaces any existing index.
    pub fn set_index(&self, name: &str) -> Result<Frame, FrameError> {
        let pos = self.require(name)?;
        let mut columns = self.columns.clone();
        columns.remove(pos);
        let mut index = Vec::with_capacity(self.rows.len());
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut r = r.clone();
                index.push(r.remove(pos));
                r
            })
            .collect();
        Ok(Frame {
            columns,
            rows,
            index_name: Some(name.to_string()),
            index,
        })
    }

    /// Look up a cell by row position and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let pos = self.position(column)?;
        self.rows.get(row).map(|r| &r[pos])
    }
}
