use serde_json::Value;

/// Preference tier a backend occupies in the layered store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Survives restarts (localStorage-class).
    Durable,
    /// Survives page reloads within one host session (sessionStorage-class).
    Session,
    /// Size-constrained last resort (cookie-class, ~4KB).
    Tiny,
}

impl LayerKind {
    pub fn label(self) -> &'static str {
        match self {
            LayerKind::Durable => "durable",
            LayerKind::Session => "session",
            LayerKind::Tiny => "tiny",
        }
    }
}

/// Result of an accepted write call that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    /// The backend's own admission policy refused the value. Not a failure;
    /// the layer stays available.
    Declined,
}

/// A key-value capable persistence primitive.
///
/// Implementations must never panic; anything that can go wrong (quota,
/// disabled storage, corrupt content) surfaces as an `Err`, and the layered
/// store reacts by dropping the layer for the rest of the session.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> LayerKind;

    fn get(&self, namespace: &str, key: &str) -> anyhow::Result<Option<Value>>;

    fn set(&self, namespace: &str, key: &str, value: &Value) -> anyhow::Result<WriteOutcome>;

    fn remove(&self, namespace: &str, key: &str) -> anyhow::Result<()>;
}
