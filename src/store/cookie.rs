use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use super::backend::{LayerKind, StorageBackend, WriteOutcome};

/// Total jar size, matching the cookie-class ~4KB ceiling.
pub const DEFAULT_JAR_CAPACITY: usize = 4096;

/// Cookie-jar backend: one `name=value` line per key in a single small file.
///
/// Percent values are written bare (`kajabi_video_progress_101=95`); anything
/// non-numeric is base64-encoded JSON so arbitrary state stays line-safe.
/// Numeric values below the unlock threshold are declined outright: the jar
/// is too small to carry progress that does not yet unlock anything.
pub struct CookieJarBackend {
    path: PathBuf,
    prefix: String,
    percent_floor: u8,
    capacity: usize,
}

impl CookieJarBackend {
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>, percent_floor: u8) -> Self {
        CookieJarBackend {
            path: path.into(),
            prefix: prefix.into(),
            percent_floor,
            capacity: DEFAULT_JAR_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn cookie_name(&self, namespace: &str, key: &str) -> String {
        format!("{}_{}_{}", self.prefix, namespace, key)
    }

    fn load_jar(&self) -> anyhow::Result<Vec<(String, String)>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        let mut jar = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once('=') {
                jar.push((name.to_string(), value.to_string()));
            }
        }
        Ok(jar)
    }

    fn save_jar(&self, jar: &[(String, String)]) -> anyhow::Result<()> {
        let mut raw = String::new();
        for (name, value) in jar {
            raw.push_str(name);
            raw.push('=');
            raw.push_str(value);
            raw.push('\n');
        }
        if raw.len() > self.capacity {
            return Err(anyhow!(
                "cookie jar over capacity ({} > {} bytes)",
                raw.len(),
                self.capacity
            ));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn encode(value: &Value) -> anyhow::Result<String> {
        if let Some(n) = value.as_u64() {
            return Ok(n.to_string());
        }
        Ok(BASE64.encode(serde_json::to_vec(value)?))
    }

    fn decode(raw: &str) -> anyhow::Result<Value> {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            let n: u64 = raw.parse()?;
            return Ok(Value::from(n));
        }
        let bytes = BASE64
            .decode(raw)
            .with_context(|| "unreadable cookie value")?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl StorageBackend for CookieJarBackend {
    fn kind(&self) -> LayerKind {
        LayerKind::Tiny
    }

    fn get(&self, namespace: &str, key: &str) -> anyhow::Result<Option<Value>> {
        let name = self.cookie_name(namespace, key);
        let jar = self.load_jar()?;
        match jar.iter().find(|(n, _)| *n == name) {
            Some((_, raw)) => Ok(Some(Self::decode(raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, namespace: &str, key: &str, value: &Value) -> anyhow::Result<WriteOutcome> {
        if let Some(n) = value.as_u64()
            && n < u64::from(self.percent_floor)
        {
            return Ok(WriteOutcome::Declined);
        }
        let name = self.cookie_name(namespace, key);
        let encoded = Self::encode(value)?;
        let mut jar = self.load_jar()?;
        match jar.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = encoded,
            None => jar.push((name, encoded)),
        }
        self.save_jar(&jar)?;
        Ok(WriteOutcome::Stored)
    }

    fn remove(&self, namespace: &str, key: &str) -> anyhow::Result<()> {
        let name = self.cookie_name(namespace, key);
        let mut jar = self.load_jar()?;
        let before = jar.len();
        jar.retain(|(n, _)| *n != name);
        if jar.len() != before {
            self.save_jar(&jar)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn scratch_jar() -> PathBuf {
        std::env::temp_dir().join(format!("lesson_gate_jar_{}.txt", Uuid::new_v4()))
    }

    #[test]
    fn sub_threshold_percent_is_declined() {
        let path = scratch_jar();
        let jar = CookieJarBackend::new(&path, "kajabi", 90);

        assert_eq!(jar.set("video_progress", "101", &json!(50)).unwrap(), WriteOutcome::Declined);
        assert_eq!(jar.get("video_progress", "101").unwrap(), None);
        assert!(!path.exists());

        assert_eq!(jar.set("video_progress", "101", &json!(95)).unwrap(), WriteOutcome::Stored);
        assert_eq!(jar.get("video_progress", "101").unwrap(), Some(json!(95)));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("kajabi_video_progress_101=95"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn non_numeric_state_roundtrips_through_base64() {
        let path = scratch_jar();
        let jar = CookieJarBackend::new(&path, "kajabi", 90);
        let state = json!({"shown": true, "url": "https://pages.example.com/lesson-2"});

        assert_eq!(jar.set("cta_reveal", "7", &state).unwrap(), WriteOutcome::Stored);
        assert_eq!(jar.get("cta_reveal", "7").unwrap(), Some(state));

        // The raw line must not contain unescaped JSON.
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains('{'));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn overflowing_the_jar_is_an_error() {
        let path = scratch_jar();
        let jar = CookieJarBackend::new(&path, "kajabi", 90).with_capacity(64);

        assert!(jar.set("video_progress", "1", &json!(95)).is_ok());
        let err = jar
            .set("navigation", "previous_lesson", &json!({"url": "https://pages.example.com/a-very-long-lesson-path"}))
            .unwrap_err();
        assert!(err.to_string().contains("over capacity"));

        // The earlier entry is untouched.
        assert_eq!(jar.get("video_progress", "1").unwrap(), Some(json!(95)));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn overwrite_keeps_one_entry_per_key() {
        let path = scratch_jar();
        let jar = CookieJarBackend::new(&path, "kajabi", 90);
        jar.set("video_progress", "5", &json!(91)).unwrap();
        jar.set("video_progress", "5", &json!(97)).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert_eq!(jar.get("video_progress", "5").unwrap(), Some(json!(97)));
        fs::remove_file(&path).unwrap();
    }
}
