//! Supplier model lifecycle.
//!
//! Suppliers are registered first and become scorable once an artifact is
//! attached. Scoring an `Unloaded` supplier is an error rather than a silent
//! empty ranking.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::artifact::{ArtifactError, ModelArtifact};

#[derive(Debug, Clone, PartialEq)]
pub enum SupplierState {
    Unloaded,
    Loaded(Box<ModelArtifact>),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("supplier `{0}` is not registered")]
    UnknownSupplier(String),

    #[error("supplier `{0}` has no loaded model")]
    NotLoaded(String),

    #[error("artifact belongs to supplier `{found}`, expected `{expected}`")]
    SupplierMismatch { expected: String, found: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Default)]
pub struct SupplierRegistry {
    suppliers: BTreeMap<String, SupplierState>,
}

impl SupplierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` as `Unloaded`. Re-registering keeps the current state.
    pub fn register(&mut self, id: impl Into<String>) {
        self.suppliers.entry(id.into()).or_insert(SupplierState::Unloaded);
    }

    /// Attach `artifact` to a registered supplier.
    pub fn mark_loaded(&mut self, id: &str, artifact: ModelArtifact) -> Result<(), RegistryError> {
        if artifact.supplier != id {
            return Err(RegistryError::SupplierMismatch {
                expected: id.to_string(),
                found: artifact.supplier,
            });
        }
        let state = self
            .suppliers
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownSupplier(id.to_string()))?;
        *state = SupplierState::Loaded(Box::new(artifact));
        tracing::debug!(supplier = id, "supplier model loaded");
        Ok(())
    }

    /// Register `id` and load its artifact from `dir`.
    pub fn load_from_dir(&mut self, dir: &Path, id: &str) -> Result<&ModelArtifact, RegistryError> {
        let artifact = ModelArtifact::load(&ModelArtifact::path_for(dir, id)?)?;
        self.register(id);
        self.mark_loaded(id, artifact)?;
        self.require_loaded(id)
    }

    pub fn state(&self, id: &str) -> Option<&SupplierState> {
        self.suppliers.get(id)
    }

    pub fn require_loaded(&self, id: &str) -> Result<&ModelArtifact, RegistryError> {
        match self.suppliers.get(id) {
            Some(SupplierState::Loaded(artifact)) => Ok(artifact),
            Some(SupplierState::Unloaded) => Err(RegistryError::NotLoaded(id.to_string())),
            None => Err(RegistryError::UnknownSupplier(id.to_string())),
        }
    }

    /// Registered ids in sorted order.
    pub fn suppliers(&self) -> impl Iterator<Item = &str> {
        self.suppliers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.suppliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suppliers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::tests::sample_artifact;
    use tempfile::TempDir;

    #[test]
    fn lifecycle_unloaded_to_loaded() {
        let mut reg = SupplierRegistry::new();
        reg.register("42");
        assert_eq!(reg.state("42"), Some(&SupplierState::Unloaded));
        assert!(matches!(reg.require_loaded("42"), Err(RegistryError::NotLoaded(_))));

        reg.mark_loaded("42", sample_artifact("42")).unwrap();
        assert_eq!(reg.require_loaded("42").unwrap().supplier, "42");

        // Re-registering does not unload.
        reg.register("42");
        assert!(reg.require_loaded("42").is_ok());
    }

    #[test]
    fn unknown_supplier_is_an_error() {
        let mut reg = SupplierRegistry::new();
        assert!(matches!(reg.require_loaded("9"), Err(RegistryError::UnknownSupplier(_))));
        assert!(matches!(
            reg.mark_loaded("9", sample_artifact("9")),
            Err(RegistryError::UnknownSupplier(_))
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn artifact_must_match_supplier() {
        let mut reg = SupplierRegistry::new();
        reg.register("1");
        assert!(matches!(
            reg.mark_loaded("1", sample_artifact("2")),
            Err(RegistryError::SupplierMismatch { .. })
        ));
        assert_eq!(reg.state("1"), Some(&SupplierState::Unloaded));
    }

    #[test]
    fn loads_saved_artifact_from_directory() {
        let dir = TempDir::new().unwrap();
        sample_artifact("5").save(dir.path()).unwrap();

        let mut reg = SupplierRegistry::new();
        let artifact = reg.load_from_dir(dir.path(), "5").unwrap();
        assert_eq!(artifact.supplier, "5");
        assert_eq!(reg.suppliers().collect::<Vec<_>>(), vec!["5"]);
    }
}
