// Layered best-effort persistence: durable -> session -> tiny, with an
// in-memory cache on top that can never fail.

mod backend;
mod cookie;
mod file;
mod memory;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};

pub use backend::{LayerKind, StorageBackend, WriteOutcome};
pub use cookie::{CookieJarBackend, DEFAULT_JAR_CAPACITY};
pub use file::JsonFileBackend;
pub use memory::MemoryBackend;

use crate::config::Config;

const PROBE_NAMESPACE: &str = "__layer_probe";
const PROBE_KEY: &str = "sentinel";

struct LayerSlot {
    backend: Arc<dyn StorageBackend>,
    available: AtomicBool,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<(String, String), Value>,
    /// Keys we have already tried to hydrate from the layers, hit or miss.
    hydrated: HashSet<(String, String)>,
}

/// Best-effort layered key-value store.
///
/// Reads merge across every layer that is still alive; writes fan out to all
/// of them. A layer that fails a call is dropped for the rest of the store's
/// lifetime — privacy-mode and quota conditions do not heal mid-session, and
/// re-probing a disabled storage API is itself observable. Nothing on this
/// surface returns an error: worst case the state only lives in memory and
/// the page degrades to per-load persistence.
pub struct LayeredStore {
    cache: Mutex<CacheInner>,
    layers: Vec<LayerSlot>,
}

impl LayeredStore {
    /// Build a store over backends listed in preference order and probe each
    /// one once, before any real read.
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        let layers = backends
            .into_iter()
            .map(|backend| {
                let ok = probe(backend.as_ref());
                if ok {
                    tracing::debug!(layer = backend.kind().label(), "storage layer available");
                } else {
                    tracing::warn!(
                        layer = backend.kind().label(),
                        "storage layer failed probe, disabled for this session"
                    );
                }
                LayerSlot {
                    backend,
                    available: AtomicBool::new(ok),
                }
            })
            .collect();
        LayeredStore {
            cache: Mutex::new(CacheInner::default()),
            layers,
        }
    }

    /// Standard three-layer stack: durable file blobs, a host-owned session
    /// scratch, and the cookie jar.
    pub fn from_config(config: &Config, session_scratch: Arc<MemoryBackend>) -> Arc<Self> {
        let layers: Vec<Arc<dyn StorageBackend>> = vec![
            Arc::new(JsonFileBackend::new(
                LayerKind::Durable,
                config.storage_dir.clone(),
            )),
            session_scratch,
            Arc::new(CookieJarBackend::new(
                config.cookie_jar_path.clone(),
                config.cookie_prefix.clone(),
                config.unlock_threshold,
            )),
        ];
        Arc::new(LayeredStore::new(layers))
    }

    pub fn namespace(self: &Arc<Self>, name: impl Into<String>) -> Namespace {
        Namespace {
            store: Arc::clone(self),
            name: name.into(),
        }
    }

    pub fn layer_available(&self, kind: LayerKind) -> bool {
        self.layers
            .iter()
            .any(|slot| slot.backend.kind() == kind && slot.available.load(Ordering::Relaxed))
    }

    /// Read a value, consulting the layers on first touch of a key.
    ///
    /// Numeric candidates merge by maximum (a degraded layer may hold a
    /// stale lower value); anything else takes the first hit in preference
    /// order. The winner lands in the memory cache, which is authoritative
    /// from then on.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let cache_key = (namespace.to_string(), key.to_string());
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = cache.entries.get(&cache_key) {
                return Some(value.clone());
            }
            if cache.hydrated.contains(&cache_key) {
                return None;
            }
        }

        let merged = self.read_layers(namespace, key);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.hydrated.insert(cache_key.clone());
        if let Some(value) = &merged {
            cache.entries.insert(cache_key, value.clone());
        }
        merged
    }

    /// Write a value: memory first (never fails), then every layer that is
    /// still alive. Numeric values only ever go up.
    pub fn set(&self, namespace: &str, key: &str, value: Value) {
        // Hydrate first so the monotonic merge sees prior-session state.
        let existing = self.get(namespace, key);
        let merged = merge_value(existing.as_ref(), value);

        let cache_key = (namespace.to_string(), key.to_string());
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache.entries.insert(cache_key, merged.clone());
        }

        for slot in &self.layers {
            self.write_slot(slot, namespace, key, &merged);
        }
    }

    /// Re-serialize the whole in-memory map to every available layer.
    ///
    /// Called on page-hide and at session teardown: some mobile browsers
    /// silently evict storage on backgrounding, so a probe that passed at
    /// init does not guarantee earlier writes stuck.
    pub fn flush_all(&self) {
        let snapshot: Vec<((String, String), Value)> = {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        let mut written = 0usize;
        for ((namespace, key), value) in &snapshot {
            for slot in &self.layers {
                self.write_slot(slot, namespace, key, value);
            }
            written += 1;
        }
        tracing::debug!(entries = written, "flushed store to surviving layers");
    }

    fn read_layers(&self, namespace: &str, key: &str) -> Option<Value> {
        let mut candidates = Vec::new();
        for slot in &self.layers {
            if !slot.available.load(Ordering::Relaxed) {
                continue;
            }
            match slot.backend.get(namespace, key) {
                Ok(Some(value)) => candidates.push(value),
                Ok(None) => {}
                Err(e) => self.disable_slot(slot, "read", &e),
            }
        }
        if candidates.is_empty() {
            return None;
        }
        if candidates.iter().all(|v| v.as_u64().is_some()) {
            return candidates.into_iter().max_by_key(|v| v.as_u64());
        }
        candidates.into_iter().next()
    }

    fn write_slot(&self, slot: &LayerSlot, namespace: &str, key: &str, value: &Value) {
        if !slot.available.load(Ordering::Relaxed) {
            return;
        }
        match slot.backend.set(namespace, key, value) {
            Ok(WriteOutcome::Stored) => {}
            Ok(WriteOutcome::Declined) => {
                tracing::trace!(
                    layer = slot.backend.kind().label(),
                    namespace,
                    key,
                    "layer declined value"
                );
            }
            Err(e) => self.disable_slot(slot, "write", &e),
        }
    }

    fn disable_slot(&self, slot: &LayerSlot, op: &str, err: &anyhow::Error) {
        slot.available.store(false, Ordering::Relaxed);
        tracing::warn!(
            layer = slot.backend.kind().label(),
            op,
            error = %err,
            "storage layer failed, dropping it for the rest of the session"
        );
    }
}

/// Write+read+delete of a fixed sentinel under a private key. Any error,
/// declined write or readback mismatch counts as an unusable layer.
fn probe(backend: &dyn StorageBackend) -> bool {
    let sentinel = json!(100);
    let stored = match backend.set(PROBE_NAMESPACE, PROBE_KEY, &sentinel) {
        Ok(WriteOutcome::Stored) => true,
        Ok(WriteOutcome::Declined) | Err(_) => false,
    };
    if !stored {
        return false;
    }
    let read_back = matches!(backend.get(PROBE_NAMESPACE, PROBE_KEY), Ok(Some(v)) if v == sentinel);
    let removed = backend.remove(PROBE_NAMESPACE, PROBE_KEY).is_ok();
    read_back && removed
}

fn merge_value(existing: Option<&Value>, incoming: Value) -> Value {
    match (existing.and_then(Value::as_u64), incoming.as_u64()) {
        (Some(old), Some(new)) if old > new => json!(old),
        _ => incoming,
    }
}

/// A store view bound to one logical namespace, so collaborating features
/// share a single store without repeating namespace strings.
#[derive(Clone)]
pub struct Namespace {
    store: Arc<LayeredStore>,
    name: String,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.name, key)
    }

    pub fn set(&self, key: &str, value: Value) {
        self.store.set(&self.name, key, value);
    }
}
