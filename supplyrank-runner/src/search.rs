//! Hyperparameter search: random sampling scored by cross-validation.
//!
//! Each trial draws one [`HyperParams`] from the [`SearchSpace`] with an RNG
//! derived from `(random_state, trial_id)`, fits one model per fold, and
//! scores the mean validation metric. Trials are independent, so they can run
//! on rayon workers; their records are gathered in trial order before the best
//! one is chosen (highest score, lowest trial id on ties).
//!
//! A trial whose fit fails scores `-inf` and the search continues. Only a
//! search in which every trial fails is an error.

use std::fmt;

use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplyrank_core::dataset::Dataset;
use supplyrank_core::metrics::{log_loss, roc_auc};
use supplyrank_core::rng::RngHierarchy;
use supplyrank_core::trainer::{HyperParams, ModelTrainer};

use crate::folds::{create_folds, Fold};
use crate::history::TrialHistory;

// ─── Metric ──────────────────────────────────────────────────────────

/// Which validation metric to maximise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMetric {
    #[default]
    RocAuc,
    /// Negated mean log loss, so that higher is better like AUC.
    NegLogLoss,
}

impl SearchMetric {
    /// Score predictions; `None` when the metric is undefined for these labels.
    pub fn score(&self, labels: &[f64], probs: &[f64]) -> Option<f64> {
        match self {
            Self::RocAuc => roc_auc(labels, probs),
            Self::NegLogLoss => log_loss(labels, probs).map(|l| -l),
        }
    }

    /// Returns true if `a` is better than `b`.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }
}

impl fmt::Display for SearchMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RocAuc => write!(f, "roc_auc"),
            Self::NegLogLoss => write!(f, "neg_log_loss"),
        }
    }
}

// ─── Search space ────────────────────────────────────────────────────

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntRange {
    pub low: usize,
    pub high: usize,
}

/// Float range, sampled uniformly or log-uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloatRange {
    pub low: f64,
    pub high: f64,
    #[serde(default)]
    pub log: bool,
}

impl IntRange {
    fn sample(&self, rng: &mut StdRng) -> usize {
        rng.gen_range(self.low..=self.high)
    }
}

impl FloatRange {
    fn sample(&self, rng: &mut StdRng) -> f64 {
        if self.low == self.high {
            return self.low;
        }
        if self.log {
            rng.gen_range(self.low.ln()..=self.high.ln())
                .exp()
                .clamp(self.low, self.high)
        } else {
            rng.gen_range(self.low..=self.high)
        }
    }
}

/// Ranges for every boosting hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSpace {
    pub n_estimators: IntRange,
    pub max_depth: IntRange,
    pub learning_rate: FloatRange,
    pub min_samples_leaf: IntRange,
    pub l2_regularization: FloatRange,
    pub subsample: FloatRange,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            n_estimators: IntRange { low: 50, high: 300 },
            max_depth: IntRange { low: 2, high: 6 },
            learning_rate: FloatRange {
                low: 0.01,
                high: 0.3,
                log: true,
            },
            min_samples_leaf: IntRange { low: 1, high: 20 },
            l2_regularization: FloatRange {
                low: 1e-3,
                high: 10.0,
                log: true,
            },
            subsample: FloatRange {
                low: 0.5,
                high: 1.0,
                log: false,
            },
        }
    }
}

impl SearchSpace {
    pub fn sample(&self, rng: &mut StdRng) -> HyperParams {
        HyperParams {
            n_estimators: self.n_estimators.sample(rng),
            max_depth: self.max_depth.sample(rng),
            learning_rate: self.learning_rate.sample(rng),
            min_samples_leaf: self.min_samples_leaf.sample(rng),
            l2_regularization: self.l2_regularization.sample(rng),
            subsample: self.subsample.sample(rng),
        }
    }

    /// Every range must be non-empty; log ranges must be positive.
    pub fn validate(&self) -> Result<(), SearchError> {
        let ints = [
            ("n_estimators", self.n_estimators),
            ("max_depth", self.max_depth),
            ("min_samples_leaf", self.min_samples_leaf),
        ];
        for (name, r) in ints {
            if r.low > r.high {
                return Err(SearchError::Configuration(format!(
                    "search_space.{name}: low {} > high {}",
                    r.low, r.high
                )));
            }
        }
        let floats = [
            ("learning_rate", self.learning_rate),
            ("l2_regularization", self.l2_regularization),
            ("subsample", self.subsample),
        ];
        for (name, r) in floats {
            if !(r.low.is_finite() && r.high.is_finite()) || r.low > r.high {
                return Err(SearchError::Configuration(format!(
                    "search_space.{name}: invalid range [{}, {}]",
                    r.low, r.high
                )));
            }
            if r.log && r.low <= 0.0 {
                return Err(SearchError::Configuration(format!(
                    "search_space.{name}: log range must be positive"
                )));
            }
        }
        Ok(())
    }
}

// ─── Records and state ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    Completed { fold_scores: Vec<f64> },
    Failed { reason: String },
}

/// Outcome of one sampled configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: usize,
    pub params: HyperParams,
    /// Mean fold score; `-inf` for failed trials (written as `null` in JSON).
    #[serde(with = "score_serde")]
    pub score: f64,
    pub status: TrialStatus,
}

impl TrialRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TrialStatus::Failed { .. })
    }
}

mod score_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(score: &f64, s: S) -> Result<S::Ok, S::Error> {
        if score.is_finite() {
            s.serialize_some(score)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NEG_INFINITY))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchState {
    NotStarted,
    Running { completed: usize, n_trials: usize },
    Completed { best_trial: usize, best_score: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub best_trial: usize,
    pub best_params: HyperParams,
    pub best_score: f64,
    pub metric: SearchMetric,
    /// Every trial, in trial order.
    pub trials: Vec<TrialRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialFailure {
    pub trial_id: usize,
    pub reason: String,
}

fn list_failures(failures: &[TrialFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("trial {}: {}", f.trial_id, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search configuration: {0}")]
    Configuration(String),

    #[error("all {} trials failed: {}", .failures.len(), list_failures(.failures))]
    Exhausted { failures: Vec<TrialFailure> },

    #[error("failed to record trial history: {0}")]
    History(#[from] std::io::Error),
}

// ─── Search ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub n_trials: usize,
    pub n_folds: usize,
    pub random_state: u64,
    pub metric: SearchMetric,
    pub parallel: bool,
}

pub struct HyperparameterSearch {
    settings: SearchSettings,
    space: SearchSpace,
    state: SearchState,
    history: Option<TrialHistory>,
}

impl HyperparameterSearch {
    pub fn new(settings: SearchSettings, space: SearchSpace) -> Self {
        Self {
            settings,
            space,
            state: SearchState::NotStarted,
            history: None,
        }
    }

    /// Persist every trial record to `history` as it is aggregated.
    pub fn with_history(mut self, history: TrialHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Run every trial against `data` and return the best configuration.
    pub fn run(&mut self, data: &Dataset) -> Result<SearchOutcome, SearchError> {
        let n_trials = self.settings.n_trials;
        if n_trials == 0 {
            return Err(SearchError::Configuration("n_trials must be at least 1".into()));
        }
        self.space.validate()?;
        let folds = create_folds(&data.labels, self.settings.n_folds, self.settings.random_state)
            .map_err(|e| SearchError::Configuration(e.to_string()))?;

        tracing::info!(
            n_trials,
            n_folds = folds.len(),
            rows = data.len(),
            positives = data.positives(),
            metric = %self.settings.metric,
            parallel = self.settings.parallel,
            "starting hyperparameter search"
        );
        self.state = SearchState::Running {
            completed: 0,
            n_trials,
        };

        let records: Vec<TrialRecord> = if self.settings.parallel {
            (0..n_trials)
                .into_par_iter()
                .map(|id| self.evaluate_trial(id, data, &folds))
                .collect()
        } else {
            (0..n_trials)
                .map(|id| self.evaluate_trial(id, data, &folds))
                .collect()
        };

        // Single aggregation point, in trial order.
        let mut best: Option<usize> = None;
        for (completed, record) in records.iter().enumerate() {
            if let Some(history) = &self.history {
                history.append(record)?;
            }
            self.state = SearchState::Running {
                completed: completed + 1,
                n_trials,
            };
            if record.is_failed() {
                continue;
            }
            let improves = best.map_or(true, |b| {
                self.settings.metric.is_better(record.score, records[b].score)
            });
            if improves {
                tracing::info!(
                    trial = record.trial_id,
                    score = record.score,
                    "new best trial"
                );
                best = Some(completed);
            }
        }

        let Some(best) = best else {
            let failures = records
                .iter()
                .filter_map(|r| match &r.status {
                    TrialStatus::Failed { reason } => Some(TrialFailure {
                        trial_id: r.trial_id,
                        reason: reason.clone(),
                    }),
                    TrialStatus::Completed { .. } => None,
                })
                .collect();
            return Err(SearchError::Exhausted { failures });
        };

        let winner = &records[best];
        self.state = SearchState::Completed {
            best_trial: winner.trial_id,
            best_score: winner.score,
        };
        tracing::info!(
            best_trial = winner.trial_id,
            best_score = winner.score,
            failed = records.iter().filter(|r| r.is_failed()).count(),
            "search completed"
        );

        Ok(SearchOutcome {
            best_trial: winner.trial_id,
            best_params: winner.params.clone(),
            best_score: winner.score,
            metric: self.settings.metric,
            trials: records,
        })
    }

    fn evaluate_trial(&self, trial_id: usize, data: &Dataset, folds: &[Fold]) -> TrialRecord {
        let seeds = RngHierarchy::new(self.settings.random_state);
        let params = self.space.sample(&mut seeds.rng_for("trial", trial_id as u64));
        let trainer = ModelTrainer::new(seeds.sub_seed("fit", trial_id as u64));

        let status = match self.cross_validate(&trainer, &params, data, folds) {
            Ok(fold_scores) if !fold_scores.is_empty() => TrialStatus::Completed { fold_scores },
            Ok(_) => TrialStatus::Failed {
                reason: format!("{} is undefined on every fold", self.settings.metric),
            },
            Err(reason) => TrialStatus::Failed { reason },
        };

        let score = match &status {
            TrialStatus::Completed { fold_scores } => {
                fold_scores.iter().sum::<f64>() / fold_scores.len() as f64
            }
            TrialStatus::Failed { reason } => {
                tracing::warn!(trial = trial_id, %reason, "trial failed");
                f64::NEG_INFINITY
            }
        };
        tracing::debug!(trial = trial_id, score, ?params, "trial evaluated");

        TrialRecord {
            trial_id,
            params,
            score,
            status,
        }
    }

    /// Fold scores for the folds where the metric is defined.
    fn cross_validate(
        &self,
        trainer: &ModelTrainer,
        params: &HyperParams,
        data: &Dataset,
        folds: &[Fold],
    ) -> Result<Vec<f64>, String> {
        let mut scores = Vec::with_capacity(folds.len());
        for fold in folds {
            let train = data.subset(&fold.train);
            if train.positives() == 0 || train.positives() == train.len() {
                tracing::debug!(fold = fold.fold_index, "training split has one class; fold skipped");
                continue;
            }
            let valid = data.subset(&fold.valid);

            let model = trainer.fit(&train, params).map_err(|e| e.to_string())?;
            let probs = model.predict_batch(&valid.features);
            match self.settings.metric.score(&valid.labels, &probs) {
                Some(s) => {
                    tracing::debug!(fold = fold.fold_index, score = s, "fold scored");
                    scores.push(s);
                }
                None => tracing::debug!(fold = fold.fold_index, "metric undefined; fold skipped"),
            }
        }
        Ok(scores)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
