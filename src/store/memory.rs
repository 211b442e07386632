use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use super::backend::{LayerKind, StorageBackend, WriteOutcome};

/// Plain in-process map backend.
///
/// Hosts keep one instance alive across page sessions and hand it to each
/// new store as the session layer; tests use it for everything.
pub struct MemoryBackend {
    kind: LayerKind,
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryBackend {
    pub fn new(kind: LayerKind) -> Self {
        MemoryBackend {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn kind(&self) -> LayerKind {
        self.kind
    }

    fn get(&self, namespace: &str, key: &str) -> anyhow::Result<Option<Value>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: &Value) -> anyhow::Result<WriteOutcome> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert((namespace.to_string(), key.to_string()), value.clone());
        Ok(WriteOutcome::Stored)
    }

    fn remove(&self, namespace: &str, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}
