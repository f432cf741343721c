use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::sequence::{Sequence, SequenceRecord};

/// Current version of the component cache format.
pub const CACHE_VERSION: u32 = 1;

/// Maximum supported version (for forward-compat rejection).
const MAX_SUPPORTED_VERSION: u32 = 1;

/// Components saved by one session to seed another.
///
/// The file records a fingerprint of the catalog it was written against;
/// loading it against a different catalog is refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentCache {
    /// Missing in old JSON → serde default fills CACHE_VERSION.
    #[serde(default = "default_version")]
    version: u32,
    catalog_fingerprint: String,
    sequences: Vec<SequenceRecord>,
}

fn default_version() -> u32 {
    CACHE_VERSION
}

impl ComponentCache {
    /// Snapshot `sequences`. Sequences holding non-finite floats cannot be
    /// written as JSON and are left out.
    pub fn from_sequences(catalog: &Catalog, sequences: &[Sequence]) -> Self {
        ComponentCache {
            version: CACHE_VERSION,
            catalog_fingerprint: catalog.fingerprint(),
            sequences: sequences
                .iter()
                .map(Sequence::to_record)
                .filter(SequenceRecord::is_portable)
                .collect(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn catalog_fingerprint(&self) -> &str {
        &self.catalog_fingerprint
    }

    pub fn records(&self) -> &[SequenceRecord] {
        &self.sequences
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects caches with version > MAX_SUPPORTED_VERSION.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let cache: ComponentCache = serde_json::from_str(json)?;
        if cache.version > MAX_SUPPORTED_VERSION {
            return Err(EngineError::Cache(format!(
                "unsupported cache version {}: max supported is {}",
                cache.version, MAX_SUPPORTED_VERSION
            )));
        }
        Ok(cache)
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        fs::write(path, self.to_json()?)
            .map_err(|e| EngineError::Cache(format!("cannot write {}: {e}", path.display())))
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let json = fs::read_to_string(path)
            .map_err(|e| EngineError::Cache(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Rebuild the sequences against `catalog`.
    pub fn resolve(&self, catalog: &Catalog) -> Result<Vec<Sequence>, EngineError> {
        let expected = catalog.fingerprint();
        if self.catalog_fingerprint != expected {
            return Err(EngineError::Cache(format!(
                "catalog mismatch: cache was written for {}, current catalog is {}",
                self.catalog_fingerprint, expected
            )));
        }
        self.sequences
            .iter()
            .map(|record| Sequence::from_record(record, catalog))
            .collect()
    }
}

#[cfg(test)]
mod cache_tests {
    use super::*;

    #[test]
    fn test_missing_version_defaults() {
        let cache = ComponentCache::from_json(r#"{"catalog_fingerprint": "sha256:00", "sequences": []}"#).unwrap();
        assert_eq!(cache.version(), CACHE_VERSION);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_future_version_rejected() {
        let err = ComponentCache::from_json(r#"{"version": 99, "catalog_fingerprint": "x", "sequences": []}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported cache version 99"));
    }

    #[test]
    fn test_fingerprint_mismatch_rejected() {
        let cache = ComponentCache::from_json(r#"{"catalog_fingerprint": "sha256:00", "sequences": []}"#).unwrap();
        let catalog = Catalog::default();
        assert!(matches!(cache.resolve(&catalog), Err(EngineError::Cache(_))));
    }
}
