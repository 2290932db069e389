//! Numeric training matrix built from a labelled frame.
//!
//! Numeric and boolean cells map to `f64`, missing cells to `NaN`. String
//! columns are encoded with a sorted dictionary so the same categories always
//! receive the same codes. The encoders travel with the model in a
//! [`FeatureSchema`], which re-encodes candidate frames at scoring time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::frame::{Frame, Value};
use crate::trainer::TrainingError;

/// How one feature column becomes a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Encoding {
    Numeric,
    /// Code = position in the sorted category list; unseen values encode as NaN.
    Categorical { categories: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub encoding: Encoding,
}

/// Ordered feature columns and their encoders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    /// Infer encoders from the cells of `frame`, skipping `exclude`.
    pub fn infer(frame: &Frame, exclude: &[&str]) -> Result<Self, TrainingError> {
        let mut columns = Vec::new();
        for name in frame.columns() {
            if exclude.contains(&name.as_str()) {
                continue;
            }
            let cells = frame.column(name)?;
            if let Some(bad) = cells
                .iter()
                .find(|c| matches!(c, Value::Vector(_) | Value::Date(_)))
            {
                return Err(TrainingError::UnsupportedFeature {
                    column: name.clone(),
                    reason: format!("{} cells cannot be encoded", bad.kind()),
                });
            }
            let encoding = if cells.iter().any(|c| matches!(c, Value::Str(_))) {
                let categories: BTreeSet<String> = cells
                    .iter()
                    .filter(|c| !c.is_missing())
                    .map(|c| c.to_string())
                    .collect();
                Encoding::Categorical {
                    categories: categories.into_iter().collect(),
                }
            } else {
                Encoding::Numeric
            };
            columns.push(FeatureColumn {
                name: name.clone(),
                encoding,
            });
        }
        Ok(Self { columns })
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Encode every row of `frame` into feature order. Extra columns are ignored.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<Vec<f64>>, TrainingError> {
        let positions = self
            .columns
            .iter()
            .map(|c| frame.require(&c.name))
            .collect::<Result<Vec<_>, _>>()?;

        frame
            .rows()
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(&positions)
                    .map(|(col, &pos)| encode_cell(col, &row[pos]))
                    .collect::<Result<Vec<f64>, _>>()
            })
            .collect()
    }
}

fn encode_cell(col: &FeatureColumn, cell: &Value) -> Result<f64, TrainingError> {
    if cell.is_missing() {
        return Ok(f64::NAN);
    }
    match &col.encoding {
        Encoding::Categorical { categories } => Ok(categories
            .binary_search(&cell.to_string())
            .map(|code| code as f64)
            .unwrap_or(f64::NAN)),
        Encoding::Numeric => cell.as_f64().ok_or_else(|| TrainingError::UnsupportedFeature {
            column: col.name.clone(),
            reason: format!("{} cell in a numeric column", cell.kind()),
        }),
    }
}

/// Feature matrix, labels and row ids of one supplier's training set.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Row-major features, `features[row][feature]`.
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub ids: Vec<Value>,
    pub schema: FeatureSchema,
}

impl Dataset {
    /// Build from a frame whose `label_column` holds 0/1 labels; every other
    /// column is a feature.
    pub fn from_frame(frame: &Frame, label_column: &str) -> Result<Self, TrainingError> {
        let label_pos = frame.require(label_column)?;
        let schema = FeatureSchema::infer(frame, &[label_column])?;
        let features = schema.encode(frame)?;

        let labels = frame
            .rows()
            .iter()
            .enumerate()
            .map(|(row, r)| match r[label_pos].as_f64() {
                Some(y) if y == 0.0 || y == 1.0 => Ok(y),
                _ => Err(TrainingError::InvalidLabel {
                    row,
                    value: r[label_pos].to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ids = if frame.index().is_empty() {
            (0..frame.height() as i64).map(Value::Int).collect()
        } else {
            frame.index().to_vec()
        };

        tracing::debug!(
            rows = features.len(),
            features = schema.len(),
            "encoded dataset"
        );
        Ok(Self {
            features,
            labels,
            ids,
            schema,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|y| **y == 1.0).count()
    }

    /// Rows at `positions`, in order, sharing the schema.
    pub fn subset(&self, positions: &[usize]) -> Dataset {
        Dataset {
            features: positions.iter().map(|&i| self.features[i].clone()).collect(),
            labels: positions.iter().map(|&i| self.labels[i]).collect(),
            ids: positions.iter().map(|&i| self.ids[i].clone()).collect(),
            schema: self.schema.clone(),
        }
    }
}
