//! Persisted per-supplier model artifacts.
//!
//! An artifact holds everything needed to score candidates without
//! retraining: the feature schema the model was fitted on, the winning
//! hyperparameters and the fitted trees. It is written as pretty JSON to
//! `{dir}/supplier={id}/model.json`.
//!
//! The `fingerprint` is a BLAKE3 hash of the canonical JSON of
//! `(params, model)`. It is recomputed on load; a mismatch means the file was
//! edited or truncated.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplyrank_core::dataset::FeatureSchema;
use supplyrank_core::gbdt::GbdtModel;
use supplyrank_core::trainer::HyperParams;

use crate::search::SearchMetric;

/// Current artifact layout version. Newer versions are rejected on load.
pub const SCHEMA_VERSION: u32 = 1;

/// File name inside the supplier directory.
pub const ARTIFACT_FILE: &str = "model.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact IO failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unsupported artifact schema version {found} (max supported: {SCHEMA_VERSION})")]
    UnsupportedVersion { found: u32 },

    #[error("artifact fingerprint mismatch: stored {stored}, computed {computed}")]
    FingerprintMismatch { stored: String, computed: String },

    #[error("supplier id `{0}` cannot name an artifact directory")]
    InvalidSupplierId(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub supplier: String,
    pub params: HyperParams,
    /// Mean cross-validation score of the winning trial.
    pub cv_score: f64,
    pub metric: SearchMetric,
    pub feature_schema: FeatureSchema,
    pub model: GbdtModel,
    pub fingerprint: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    params: &'a HyperParams,
    model: &'a GbdtModel,
}

/// BLAKE3 hex digest of the canonical JSON of `(params, model)`.
pub fn fingerprint(params: &HyperParams, model: &GbdtModel) -> Result<String, ArtifactError> {
    let json = serde_json::to_vec(&FingerprintInput { params, model })?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

impl ModelArtifact {
    pub fn new(
        supplier: impl Into<String>,
        params: HyperParams,
        cv_score: f64,
        metric: SearchMetric,
        feature_schema: FeatureSchema,
        model: GbdtModel,
    ) -> Result<Self, ArtifactError> {
        let fingerprint = fingerprint(&params, &model)?;
        Ok(Self {
            schema_version: SCHEMA_VERSION,
            supplier: supplier.into(),
            params,
            cv_score,
            metric,
            feature_schema,
            model,
            fingerprint,
            created_at: chrono::Local::now().naive_local(),
        })
    }

    /// Artifact path for `supplier` under `dir`.
    ///
    /// The id becomes a single path component, so it must be non-empty and
    /// free of separators and `..`.
    pub fn path_for(dir: &Path, supplier: &str) -> Result<PathBuf, ArtifactError> {
        let unsafe_id = supplier.trim().is_empty()
            || supplier.contains(['/', '\\', '\0'])
            || supplier.contains("..");
        if unsafe_id {
            return Err(ArtifactError::InvalidSupplierId(supplier.to_string()));
        }
        Ok(dir.join(format!("supplier={supplier}")).join(ARTIFACT_FILE))
    }

    /// Write to `supplier={id}/model.json` under `dir`.
    ///
    /// Writes are atomic: write to .tmp then rename.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ArtifactError> {
        let path = Self::path_for(dir, &self.supplier)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_error(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_error(&path)(e)
        })?;

        tracing::info!(
            supplier = %self.supplier,
            path = %path.display(),
            fingerprint = %self.fingerprint,
            "saved model artifact"
        );
        Ok(path)
    }

    /// Read an artifact file, rejecting unknown versions and tampered models.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let json = fs::read_to_string(path).map_err(io_error(path))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let artifact: Self = serde_json::from_str(json)?;
        if artifact.schema_version > SCHEMA_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: artifact.schema_version,
            });
        }
        let computed = fingerprint(&artifact.params, &artifact.model)?;
        if computed != artifact.fingerprint {
            return Err(ArtifactError::FingerprintMismatch {
                stored: artifact.fingerprint,
                computed,
            });
        }
        Ok(artifact)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
