//! A key/value document store addressed by `<detector-class>/<persistence-id>`,
//! atomic at document granularity, plus a `Persister` that drives every
//! registered detector's `do_persist` on a fixed interval.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::detector::Detector;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error persisting '{key}': {source}")]
    Io { key: String, #[source] source: std::io::Error },
    #[error("serialization error persisting '{key}': {source}")]
    Serde { key: String, #[source] source: serde_json::Error },
}

pub trait PersistenceStore {
    fn load_json(&self, key: &str) -> Result<Option<serde_json::Value>, PersistenceError>;
    fn store_json(&self, key: &str, doc: &serde_json::Value) -> Result<(), PersistenceError>;
}

/// One JSON document per key, stored as `<base_dir>/<key>.json`, written
/// atomically via a temp file followed by a rename.
pub struct FilePersistenceStore {
    base_dir: PathBuf,
}

impl FilePersistenceStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FilePersistenceStore { base_dir: base_dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }
}

impl PersistenceStore for FilePersistenceStore {
    fn load_json(&self, key: &str) -> Result<Option<serde_json::Value>, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| PersistenceError::Io { key: key.to_string(), source })?;
        let value = serde_json::from_str(&contents).map_err(|source| PersistenceError::Serde { key: key.to_string(), source })?;
        Ok(Some(value))
    }

    fn store_json(&self, key: &str, doc: &serde_json::Value) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Io { key: key.to_string(), source })?;
        }
        let json = serde_json::to_string_pretty(doc).map_err(|source| PersistenceError::Serde { key: key.to_string(), source })?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json).map_err(|source| PersistenceError::Io { key: key.to_string(), source })?;
        std::fs::rename(&temp_path, &path).map_err(|source| PersistenceError::Io { key: key.to_string(), source })?;
        Ok(())
    }
}

/// Holds non-owning references to every persistable detector (the pipeline
/// owns them) and calls `do_persist` on each on a fixed interval.
pub struct Persister {
    store: Rc<dyn PersistenceStore>,
    components: Vec<Weak<RefCell<dyn Detector>>>,
    period_seconds: u64,
}

impl Persister {
    pub fn new(store: Rc<dyn PersistenceStore>, period_seconds: u64) -> Self {
        Persister { store, components: Vec::new(), period_seconds }
    }

    pub fn period_seconds(&self) -> u64 {
        self.period_seconds
    }

    pub fn add_persistable_component(&mut self, detector: &Rc<RefCell<dyn Detector>>) {
        self.components.push(Rc::downgrade(detector));
    }

    /// Invokes `do_persist` on every still-live registered component.
    /// Errors are logged, not propagated: the detector keeps running and
    /// the next interval retries.
    pub fn persist_all(&self) {
        for weak in &self.components {
            let Some(detector) = weak.upgrade() else { continue };
            let detector = detector.borrow();
            let Some(key) = detector.persistence_key() else { continue };
            let Some(doc) = detector.do_persist() else { continue };
            if let Err(err) = self.store.store_json(&key, &doc) {
                tracing::error!(key = %key, error = %err, "persistence write failed");
            }
        }
    }
}

pub fn persistence_key(detector_class: &str, persistence_id: &str) -> String {
    format!("{}/{}", detector_class, persistence_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistenceStore::new(dir.path());
        let doc = serde_json::json!({"a": 1, "b": [1, 2, 3]});
        store.store_json("Detector/default", &doc).unwrap();
        let loaded = store.load_json("Detector/default").unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn missing_key_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistenceStore::new(dir.path());
        assert!(store.load_json("Detector/missing").unwrap().is_none());
    }

    #[test]
    fn overwrite_is_atomic_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistenceStore::new(dir.path());
        store.store_json("Detector/default", &serde_json::json!({"v": 1})).unwrap();
        store.store_json("Detector/default", &serde_json::json!({"v": 2})).unwrap();
        let loaded = store.load_json("Detector/default").unwrap().unwrap();
        assert_eq!(loaded["v"], 2);
        assert!(!dir.path().join("Detector/default.json.tmp").exists());
    }

    #[test]
    fn key_format_matches_class_slash_persistence_id() {
        assert_eq!(persistence_key("ValueRangeDetector", "default"), "ValueRangeDetector/default");
    }
}
