//! Error taxonomy shared by the feature, selection and target stages.

use thiserror::Error;

use crate::frame::FrameError;

/// Missing or malformed configuration, or a corpus that lacks a configured column.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("column `{column}` is missing from the {corpus} corpus")]
    MissingColumn { column: String, corpus: &'static str },

    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("frame operation failed: {0}")]
    Frame(#[from] FrameError),

    #[error("table operation failed: {0}")]
    Table(String),
}

impl From<polars::prelude::PolarsError> for ConfigurationError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        ConfigurationError::Table(err.to_string())
    }
}

impl ConfigurationError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// A corpus whose cells do not have the expected shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("row {row}: column `{column}` holds a {found}, expected a vector")]
    NotAVector {
        row: usize,
        column: String,
        found: &'static str,
    },

    #[error("row {row}: embedding in `{column}` has {actual} components, expected {expected}")]
    EmbeddingDimension {
        row: usize,
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("row {row}: cannot read a date from `{column}` ({value})")]
    InvalidDate {
        row: usize,
        column: String,
        value: String,
    },

    #[error("column `{column}` has unsupported type {dtype}")]
    UnsupportedType { column: String, dtype: String },
}

/// Failure of the feature generator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl From<FrameError> for FeatureError {
    fn from(err: FrameError) -> Self {
        FeatureError::Configuration(err.into())
    }
}

/// Check that every listed column exists in `frame`.
pub fn require_columns<S: AsRef<str>>(
    frame: &crate::frame::Frame,
    columns: &[S],
    corpus: &'static str,
) -> Result<(), ConfigurationError> {
    for c in columns {
        if !frame.has_column(c.as_ref()) {
            return Err(ConfigurationError::MissingColumn {
                column: c.as_ref().to_string(),
                corpus,
            });
        }
    }
    Ok(())
}
