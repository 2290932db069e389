//! End-to-end supplier pipeline.
//!
//! Training: training-side features → select the supplier's training rows →
//! participation target → dataset → hyperparameter search → final fit.
//!
//! Scoring: prepare corpus → generate candidate features → select the
//! supplier's candidates → encode with the artifact's schema → rank.

use thiserror::Error;

use supplyrank_core::dataset::Dataset;
use supplyrank_core::error::{require_columns, ConfigurationError, FeatureError};
use supplyrank_core::features::{generate_features, prepare_training, training_features};
use supplyrank_core::frame::{Frame, Value};
use supplyrank_core::gbdt::GbdtModel;
use supplyrank_core::selection::{select_candidates, select_training, supplier_purchases, SupplierPartition};
use supplyrank_core::target::{construct_target, TARGET_COLUMN};
use supplyrank_core::trainer::{HyperParams, ModelTrainer, TrainingError};

use crate::artifact::{ArtifactError, ModelArtifact};
use crate::config::PipelineConfig;
use crate::history::TrialHistory;
use crate::search::{HyperparameterSearch, SearchError, SearchOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Result of training one supplier.
#[derive(Debug, Clone)]
pub struct TrainedSupplier {
    pub supplier: String,
    pub model: GbdtModel,
    pub params: HyperParams,
    pub cv_score: f64,
    pub dataset: Dataset,
    pub search: SearchOutcome,
}

impl TrainedSupplier {
    /// Package the fitted model for persistence.
    pub fn to_artifact(&self) -> Result<ModelArtifact, ArtifactError> {
        ModelArtifact::new(
            self.supplier.clone(),
            self.params.clone(),
            self.cv_score,
            self.search.metric,
            self.dataset.schema.clone(),
            self.model.clone(),
        )
    }
}

/// One ranked candidate purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub id: Value,
    pub score: f64,
    /// 1-based rank, 1 = most likely to be bid on.
    pub rank: usize,
}

/// Supplier id as it appears in the corpus: numeric ids compare as numbers.
pub fn supplier_value(id: &str) -> Value {
    Value::parse_scalar(id)
}

/// Training corpus with the candidates' feature families, pruned of the
/// configured columns it carries, so that both sides share feature columns.
fn prepared_training(train_raw: &Frame, config: &PipelineConfig) -> Result<Frame, PipelineError> {
    let prepared = training_features(train_raw, &config.feature_spec())?;
    let present: Vec<&String> = config
        .preprocessing
        .drop_columns
        .iter()
        .filter(|c| prepared.has_column(c))
        .collect();
    Ok(prepared.drop_columns(&present).map_err(ConfigurationError::from)?)
}

/// Train a participation model for `supplier`.
pub fn train_supplier(
    train_raw: &Frame,
    supplier: &str,
    config: &PipelineConfig,
    history: Option<TrialHistory>,
) -> Result<TrainedSupplier, PipelineError> {
    let sup = supplier_value(supplier);
    tracing::info!(supplier, rows = train_raw.height(), "training supplier model");

    let prepared = prepared_training(train_raw, config)?;
    let selected = select_training(&prepared, &sup, config.selection())?;
    let labelled = construct_target(&selected, &sup, &config.train.sup_column)?;
    let dataset = Dataset::from_frame(&labelled, TARGET_COLUMN)?;
    if dataset.is_empty() {
        return Err(TrainingError::EmptyDataset.into());
    }
    if dataset.positives() == 0 || dataset.positives() == dataset.len() {
        return Err(TrainingError::ConstantLabels {
            label: dataset.labels[0],
        }
        .into());
    }

    let mut search = HyperparameterSearch::new(config.search_settings(), config.train.search_space.clone());
    if let Some(history) = history {
        search = search.with_history(history.for_supplier(supplier));
    }
    let outcome = search.run(&dataset)?;

    let model = ModelTrainer::new(config.train.random_state).fit(&dataset, &outcome.best_params)?;
    tracing::info!(
        supplier,
        best_trial = outcome.best_trial,
        cv_score = outcome.best_score,
        trees = model.trees.len(),
        features = dataset.feature_count(),
        "supplier model trained"
    );

    Ok(TrainedSupplier {
        supplier: supplier.to_string(),
        params: outcome.best_params.clone(),
        cv_score: outcome.best_score,
        model,
        dataset,
        search: outcome,
    })
}

/// Build the supplier-scoped candidate set with generated features.
pub fn prepare_candidates(
    train_raw: &Frame,
    candidates_raw: &Frame,
    supplier: &str,
    config: &PipelineConfig,
) -> Result<SupplierPartition, PipelineError> {
    let sup = supplier_value(supplier);
    let spec = config.feature_spec();
    let selection = config.selection();

    let prepared = prepare_training(train_raw, &spec)?;
    let features = generate_features(&prepared, candidates_raw, &spec)?;
    let purchases = supplier_purchases(train_raw, &sup, &selection.sup_column, &selection.index_column)?;
    let pruned = prepared_training(train_raw, config)?;

    let partition = select_candidates(&pruned, &features, &sup, &purchases, selection)?;
    tracing::info!(
        supplier,
        candidates = partition.candidates.height(),
        purchases = purchases.len(),
        "prepared candidates"
    );
    Ok(partition)
}

/// Score and rank candidate rows with a trained artifact.
///
/// Ties keep the candidates' original order.
pub fn score_candidates(
    artifact: &ModelArtifact,
    candidates: &Frame,
) -> Result<Vec<ScoredCandidate>, PipelineError> {
    require_columns(candidates, &artifact.feature_schema.names(), "candidate")?;
    let rows = artifact.feature_schema.encode(candidates)?;
    let scores = artifact.model.predict_batch(&rows);

    let ids: Vec<Value> = if candidates.index().is_empty() {
        (0..candidates.height() as i64).map(Value::Int).collect()
    } else {
        candidates.index().to_vec()
    };

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let ranked: Vec<ScoredCandidate> = order
        .into_iter()
        .enumerate()
        .map(|(pos, i)| ScoredCandidate {
            id: ids[i].clone(),
            score: scores[i],
            rank: pos + 1,
        })
        .collect();

    tracing::info!(
        supplier = %artifact.supplier,
        candidates = ranked.len(),
        top_score = ranked.first().map(|c| c.score),
        "scored candidates"
    );
    Ok(ranked)
}
