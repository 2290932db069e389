//! SupplyRank Runner: per-supplier training and scoring orchestration.
//!
//! This crate builds on `supplyrank-core` to provide:
//! - TOML pipeline configuration, validated once
//! - Cross-validation folds and parallel hyperparameter search
//! - JSONL trial history
//! - Model artifacts with fingerprint verification
//! - Supplier registry (unloaded → loaded lifecycle)
//! - Candidate ranking and CSV export

pub mod artifact;
pub mod config;
pub mod export;
pub mod folds;
pub mod history;
pub mod pipeline;
pub mod registry;
pub mod search;

pub use artifact::{ArtifactError, ModelArtifact};
pub use config::{ConfigError, PipelineConfig};
pub use folds::{create_folds, Fold, FoldStrategy};
pub use history::{HistoryEntry, TrialHistory};
pub use pipeline::{
    prepare_candidates, score_candidates, train_supplier, PipelineError, ScoredCandidate,
    TrainedSupplier,
};
pub use registry::{RegistryError, SupplierRegistry, SupplierState};
pub use search::{
    HyperparameterSearch, SearchError, SearchMetric, SearchOutcome, SearchSettings, SearchSpace,
    SearchState, TrialRecord, TrialStatus,
};
