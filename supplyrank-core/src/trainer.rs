//! Gradient-boosted tree trainer for the participation classifier.

use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Dataset;
use crate::frame::FrameError;
use crate::gbdt::cart::{CartBuilder, TreeConfig};
use crate::gbdt::{sigmoid, GbdtModel};
use crate::rng::RngHierarchy;

/// Hessian floor; keeps leaf weights finite once probabilities saturate.
const MIN_HESSIAN: f64 = 1e-16;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("dataset has no rows")]
    EmptyDataset,

    #[error("all labels are {label}; both classes are required")]
    ConstantLabels { label: f64 },

    #[error("feature `{column}` cannot be used: {reason}")]
    UnsupportedFeature { column: String, reason: String },

    #[error("invalid hyperparameter `{param}`: {reason}")]
    InvalidParams { param: &'static str, reason: String },

    #[error("row {row}: label `{value}` is not 0 or 1")]
    InvalidLabel { row: usize, value: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// One boosting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HyperParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
    pub l2_regularization: f64,
    /// Fraction of rows drawn (without replacement) for each tree.
    pub subsample: f64,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 3,
            learning_rate: 0.1,
            min_samples_leaf: 1,
            l2_regularization: 1.0,
            subsample: 1.0,
        }
    }
}

impl HyperParams {
    pub fn validate(&self) -> Result<(), TrainingError> {
        let invalid = |param, reason: &str| {
            Err(TrainingError::InvalidParams {
                param,
                reason: reason.to_string(),
            })
        };
        if self.n_estimators == 0 {
            return invalid("n_estimators", "must be at least 1");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf", "must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid("learning_rate", "must be in (0, 1]");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample", "must be in (0, 1]");
        }
        if !(self.l2_regularization.is_finite() && self.l2_regularization >= 0.0) {
            return invalid("l2_regularization", "must be finite and non-negative");
        }
        Ok(())
    }
}

/// Fits [`GbdtModel`]s; row subsampling is seeded per boosting round.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    rng: RngHierarchy,
}

impl ModelTrainer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RngHierarchy::new(seed),
        }
    }

    pub fn fit(&self, data: &Dataset, params: &HyperParams) -> Result<GbdtModel, TrainingError> {
        params.validate()?;
        check_dataset(data)?;

        let n = data.len();
        let positive_rate = data.positives() as f64 / n as f64;
        let bias = (positive_rate / (1.0 - positive_rate)).ln();

        let tree_config = TreeConfig {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            lambda: params.l2_regularization,
            learning_rate: params.learning_rate,
        };
        let n_sampled = ((n as f64 * params.subsample).round() as usize).clamp(1, n);

        let mut margins = vec![bias; n];
        let mut gradients = vec![0.0; n];
        let mut hessians = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                gradients[i] = p - data.labels[i];
                hessians[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let rows: Vec<usize> = if n_sampled < n {
                let mut rng = self.rng.rng_for("round", round as u64);
                let mut rows = sample(&mut rng, n, n_sampled).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };

            let tree = CartBuilder::new(&data.features, &gradients, &hessians, &tree_config).build(&rows);
            for (m, row) in margins.iter_mut().zip(&data.features) {
                *m += tree.predict(row);
            }
            trees.push(tree);

            tracing::trace!(round, rows = rows.len(), "fitted tree");
        }

        tracing::debug!(
            rows = n,
            features = data.feature_count(),
            trees = trees.len(),
            bias,
            "fitted gradient-boosted model"
        );

        Ok(GbdtModel {
            bias,
            trees,
            feature_count: data.feature_count(),
        })
    }
}

fn check_dataset(data: &Dataset) -> Result<(), TrainingError> {
    let Some(&first) = data.labels.first() else {
        return Err(TrainingError::EmptyDataset);
    };
    if data.labels.iter().all(|&y| y == first) {
        return Err(TrainingError::ConstantLabels { label: first });
    }
    for row in &data.features {
        if let Some(j) = row.iter().position(|x| x.is_infinite()) {
            let column = data
                .schema
                .columns
                .get(j)
                .map_or_else(|| j.to_string(), |c| c.name.clone());
            return Err(TrainingError::UnsupportedFeature {
                column,
                reason: "infinite value".to_string(),
            });
        }
    }
    Ok(())
}
