//! Durable JSON document store for control-plane state.
//!
//! Whole-document reads/writes are namespace-scoped (`identity`, `receiver`)
//! within a single JSON object persisted via temp-file + fsync + rename.
//! A file that fails to parse is quarantined (renamed `.corrupt`) rather
//! than blocking startup: the store resumes empty instead of refusing
//! to start.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Thread-safe, lazily-loaded JSON document store backed by a single file.
pub struct StateStore {
    path: PathBuf,
    cache: Mutex<Option<Map<String, Value>>>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Returns the full document, loading it from disk on first access.
    pub fn read_all(&self) -> Map<String, Value> {
        let mut cache = self.cache.lock();
        if cache.is_none() {
            *cache = Some(self.load_from_disk());
        }
        cache.as_ref().cloned().unwrap_or_default()
    }

    fn load_from_disk(&self) -> Map<String, Value> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Map::new(),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                self.quarantine();
                Map::new()
            }
        }
    }

    fn quarantine(&self) {
        let corrupt_path = corrupt_sibling(&self.path);
        if let Err(e) = fs::rename(&self.path, &corrupt_path) {
            log::warn!("[State] failed to quarantine corrupt state file: {e}");
        } else {
            log::warn!(
                "[State] state file was corrupt, quarantined to {}",
                corrupt_path.display()
            );
        }
    }

    /// Atomically persists the full document: write to a temp file, fsync,
    /// then rename over the target so readers never observe a partial write.
    pub fn write_all(&self, doc: Map<String, Value>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = tmp_sibling(&self.path);
        {
            let mut file = File::create(&tmp_path)?;
            let body = serde_json::to_vec_pretty(&Value::Object(doc.clone()))?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        *self.cache.lock() = Some(doc);
        Ok(())
    }

    /// Reads a namespace (a top-level object key) from the document.
    pub fn read_namespace(&self, namespace: &str) -> Map<String, Value> {
        match self.read_all().get(namespace) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// Writes a namespace, leaving the rest of the document untouched.
    pub fn write_namespace(
        &self,
        namespace: &str,
        value: Map<String, Value>,
    ) -> std::io::Result<()> {
        let mut doc = self.read_all();
        doc.insert(namespace.to_string(), Value::Object(value));
        self.write_all(doc)
    }

    /// Returns the UUID stored under `identity.<key>`, generating and
    /// persisting one on first call. Idempotent across restarts.
    pub fn get_or_create_uuid(&self, key: &str) -> String {
        let mut identity = self.read_namespace("identity");
        if let Some(Value::String(existing)) = identity.get(key) {
            return existing.clone();
        }
        let fresh = Uuid::new_v4().to_string();
        identity.insert(key.to_string(), Value::String(fresh.clone()));
        if let Err(e) = self.write_namespace("identity", identity) {
            log::error!("[State] failed to persist generated uuid for {key}: {e}");
        }
        fresh
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn corrupt_sibling(path: &Path) -> PathBuf {
    let mut corrupt = path.as_os_str().to_os_string();
    corrupt.push(".corrupt");
    PathBuf::from(corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn read_all_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("runtime.json"));
        assert!(store.read_all().is_empty());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("runtime.json"));
        let mut doc = Map::new();
        doc.insert("receiver".to_string(), json!({"volume": 42}));
        store.write_all(doc).unwrap();

        let fresh_store = StateStore::new(dir.path().join("runtime.json"));
        let ns = fresh_store.read_namespace("receiver");
        assert_eq!(ns.get("volume"), Some(&json!(42)));
    }

    #[test]
    fn corrupt_file_is_quarantined_and_store_resumes_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = StateStore::new(&path);
        assert!(store.read_all().is_empty());
        assert!(corrupt_sibling(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn get_or_create_uuid_is_stable_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        let store = StateStore::new(&path);
        let first = store.get_or_create_uuid("node_id");

        let reopened = StateStore::new(&path);
        let second = reopened.get_or_create_uuid("node_id");
        assert_eq!(first, second);
    }

    #[test]
    fn write_namespace_preserves_other_namespaces() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("runtime.json"));
        store
            .write_namespace("identity", Map::from_iter([("node_id".to_string(), json!("abc"))]))
            .unwrap();
        store
            .write_namespace("receiver", Map::from_iter([("volume".to_string(), json!(10))]))
            .unwrap();

        let identity = store.read_namespace("identity");
        assert_eq!(identity.get("node_id"), Some(&json!("abc")));
    }
}
