//! SupplyRank Core: purchase frames, feature generation, supplier selection,
//! participation targets and the boosted-tree model.
//!
//! This crate contains the data side of the recommender:
//! - `Frame` / `Value` table model with pandas-compatible duplicate semantics
//! - Corpus ingest from Parquet and CSV
//! - Feature generator (embedding split, calendar, last-value lookups)
//! - Supplier data selector with leakage removal, deduplicated on polars
//! - Target constructor and numeric dataset encoding
//! - Binary-logistic GBDT trainer and evaluation metrics
//! - Deterministic RNG hierarchy

pub mod canonicalize;
pub mod dataset;
pub mod error;
pub mod features;
pub mod frame;
pub mod gbdt;
pub mod ingest;
pub mod metrics;
pub mod rng;
pub mod selection;
pub mod target;
pub mod trainer;

pub use dataset::{Dataset, FeatureSchema};
pub use error::{ConfigurationError, FeatureError, SchemaError};
pub use features::{generate_features, prepare_training, training_features, FeatureSpec};
pub use frame::{Frame, FrameError, Value};
pub use gbdt::GbdtModel;
pub use selection::{select_candidates, select_training, supplier_purchases, SelectionConfig, SupplierPartition};
pub use target::{construct_target, TARGET_COLUMN};
pub use trainer::{HyperParams, ModelTrainer, TrainingError};
