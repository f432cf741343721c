use std::collections::BTreeMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::operation::{OpRef, Operation};

/// The operations under test, addressable by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    ops: Vec<OpRef>,
    by_id: BTreeMap<String, usize>,
}

impl Catalog {
    pub fn new(ops: Vec<Operation>) -> Result<Self, EngineError> {
        let mut catalog = Catalog::default();
        for op in ops {
            if catalog.by_id.contains_key(op.id()) {
                return Err(EngineError::Config(format!("duplicate operation id: {}", op.id())));
            }
            if !op.is_call() {
                return Err(EngineError::Config(format!(
                    "catalog entries must be calls, got {}",
                    op.id()
                )));
            }
            catalog.by_id.insert(op.id().to_string(), catalog.ops.len());
            catalog.ops.push(Arc::new(op));
        }
        Ok(catalog)
    }

    pub fn ops(&self) -> &[OpRef] {
        &self.ops
    }

    pub fn get(&self, id: &str) -> Option<OpRef> {
        self.by_id.get(id).map(|&i| Arc::clone(&self.ops[i]))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// `sha256:<hex>` over the sorted operation signatures.
    pub fn fingerprint(&self) -> String {
        let mut signatures: Vec<String> = self.ops.iter().map(|op| op.signature()).collect();
        signatures.sort();
        let mut hasher = Sha256::new();
        for sig in &signatures {
            hasher.update(sig.as_bytes());
            hasher.update(b"\n");
        }
        format!("sha256:{:x}", hasher.finalize())
    }
}
