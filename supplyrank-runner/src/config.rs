//! Pipeline configuration loaded from TOML.
//!
//! ```toml
//! [data]
//! train_data = "data/train.parquet"
//! candidate_data = "data/candidates.parquet"
//!
//! [preprocessing]
//! date = "publish_date"
//! region = "region"
//! okpd2 = "okpd2"
//! drop_columns = ["publish_date", "embedding"]
//!
//! [preprocessing.purchase_size]
//! group = "customer"
//! values = "purchase_size"
//! name = "purchase_size"
//! on_col = "customer"
//! # ... flag, uniq_okpd2, recommender
//!
//! [train]
//! vector = "embedding"
//! n_components = 16
//! sup_column = "supplier"
//! index_column = "purchase"
//! n_trials = 20
//! N_FOLDS = 5
//! random_state = 10
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplyrank_core::error::ConfigurationError;
use supplyrank_core::features::{FeatureSpec, FlagSpec, PurchaseSizeSpec, UniqueCodeSpec};
use supplyrank_core::selection::SelectionConfig;

use crate::search::{SearchMetric, SearchSettings, SearchSpace};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub preprocessing: PreprocessingConfig,
    pub train: TrainConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub train_data: PathBuf,
    pub candidate_data: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreprocessingConfig {
    pub date: String,
    pub region: String,
    pub okpd2: String,
    /// Truncate OKPD2 codes to this many characters in the composite key.
    #[serde(default)]
    pub okpd2_prefix: Option<usize>,
    #[serde(default = "default_month_name")]
    pub month_name: String,
    #[serde(default = "default_composite_name")]
    pub composite_name: String,
    /// Columns pruned after feature generation.
    #[serde(default)]
    pub drop_columns: Vec<String>,
    pub purchase_size: PurchaseSizeSpec,
    pub flag: FlagSpec,
    pub uniq_okpd2: UniqueCodeSpec,
    pub recommender: SelectionConfig,
}

fn default_month_name() -> String {
    "month".into()
}

fn default_composite_name() -> String {
    "reg_code".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    pub vector: String,
    pub n_components: usize,
    pub sup_column: String,
    pub index_column: String,
    pub n_trials: usize,
    #[serde(rename = "N_FOLDS")]
    pub n_folds: usize,
    pub random_state: u64,
    #[serde(default)]
    pub metric: SearchMetric,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub search_space: SearchSpace,
}

fn default_parallel() -> bool {
    true
}

impl PipelineConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.feature_spec().validate()?;

        let train = &self.train;
        let rec = &self.preprocessing.recommender;
        if train.n_trials == 0 {
            return Err(ConfigurationError::invalid("train.n_trials", "must be at least 1"));
        }
        if train.n_folds < 2 {
            return Err(ConfigurationError::invalid("train.N_FOLDS", "must be at least 2"));
        }
        if train.sup_column != rec.sup_column {
            return Err(ConfigurationError::invalid(
                "train.sup_column",
                format!("`{}` differs from recommender.sup_column `{}`", train.sup_column, rec.sup_column),
            ));
        }
        if train.index_column != rec.index_column {
            return Err(ConfigurationError::invalid(
                "train.index_column",
                format!(
                    "`{}` differs from recommender.index_column `{}`",
                    train.index_column, rec.index_column
                ),
            ));
        }
        train
            .search_space
            .validate()
            .map_err(|e| ConfigurationError::invalid("train.search_space", e.to_string()))?;
        Ok(())
    }

    pub fn feature_spec(&self) -> FeatureSpec {
        let p = &self.preprocessing;
        FeatureSpec {
            vector: self.train.vector.clone(),
            n_components: self.train.n_components,
            date: p.date.clone(),
            region: p.region.clone(),
            okpd2: p.okpd2.clone(),
            okpd2_prefix: p.okpd2_prefix,
            month_name: p.month_name.clone(),
            composite_name: p.composite_name.clone(),
            purchase_size: p.purchase_size.clone(),
            flag: p.flag.clone(),
            uniq_okpd2: p.uniq_okpd2.clone(),
            drop_columns: p.drop_columns.clone(),
        }
    }

    pub fn selection(&self) -> &SelectionConfig {
        &self.preprocessing.recommender
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            n_trials: self.train.n_trials,
            n_folds: self.train.n_folds,
            random_state: self.train.random_state,
            metric: self.train.metric,
            parallel: self.train.parallel,
        }
    }
}
