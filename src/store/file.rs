use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use serde_json::{Map, Value};

use super::backend::{LayerKind, StorageBackend, WriteOutcome};

/// File-per-namespace JSON backend: `<dir>/<namespace>.json` holds a single
/// object mapping key -> value, mirroring the one-blob-per-namespace layout
/// the browser durable layer uses.
pub struct JsonFileBackend {
    kind: LayerKind,
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(kind: LayerKind, dir: impl Into<PathBuf>) -> Self {
        JsonFileBackend {
            kind,
            dir: dir.into(),
        }
    }

    fn blob_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.json", namespace))
    }

    fn load_blob(&self, namespace: &str) -> anyhow::Result<Map<String, Value>> {
        let path = self.blob_path(namespace);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let blob: Map<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt namespace blob {}", path.display()))?;
        Ok(blob)
    }

    fn save_blob(&self, namespace: &str, blob: &Map<String, Value>) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.blob_path(namespace);
        let raw = serde_json::to_string(blob)?;
        fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

impl StorageBackend for JsonFileBackend {
    fn kind(&self) -> LayerKind {
        self.kind
    }

    fn get(&self, namespace: &str, key: &str) -> anyhow::Result<Option<Value>> {
        let blob = self.load_blob(namespace)?;
        Ok(blob.get(key).cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: &Value) -> anyhow::Result<WriteOutcome> {
        let mut blob = self.load_blob(namespace)?;
        blob.insert(key.to_string(), value.clone());
        self.save_blob(namespace, &blob)?;
        Ok(WriteOutcome::Stored)
    }

    fn remove(&self, namespace: &str, key: &str) -> anyhow::Result<()> {
        let mut blob = self.load_blob(namespace)?;
        if blob.remove(key).is_some() {
            self.save_blob(namespace, &blob)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lesson_gate_test_{}", Uuid::new_v4()))
    }

    #[test]
    fn roundtrip_and_missing_key() {
        let dir = scratch_dir();
        let backend = JsonFileBackend::new(LayerKind::Durable, &dir);

        assert_eq!(backend.get("video_progress", "101").unwrap(), None);
        backend.set("video_progress", "101", &json!(95)).unwrap();
        assert_eq!(
            backend.get("video_progress", "101").unwrap(),
            Some(json!(95))
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn blob_survives_a_new_instance() {
        let dir = scratch_dir();
        {
            let backend = JsonFileBackend::new(LayerKind::Durable, &dir);
            backend.set("video_progress", "7", &json!(100)).unwrap();
            backend
                .set("cta_reveal", "7", &json!({"shown": true}))
                .unwrap();
        }

        let reopened = JsonFileBackend::new(LayerKind::Durable, &dir);
        assert_eq!(reopened.get("video_progress", "7").unwrap(), Some(json!(100)));
        assert_eq!(
            reopened.get("cta_reveal", "7").unwrap(),
            Some(json!({"shown": true}))
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn remove_rewrites_the_blob() {
        let dir = scratch_dir();
        let backend = JsonFileBackend::new(LayerKind::Durable, &dir);
        backend.set("ns", "a", &json!(1)).unwrap();
        backend.set("ns", "b", &json!(2)).unwrap();
        backend.remove("ns", "a").unwrap();
        assert_eq!(backend.get("ns", "a").unwrap(), None);
        assert_eq!(backend.get("ns", "b").unwrap(), Some(json!(2)));

        fs::remove_dir_all(&dir).unwrap();
    }
}
