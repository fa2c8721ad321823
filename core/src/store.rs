use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// File-backed string map holding runtime connection overrides and the
/// active project selection. The on-disk format is a flat JSON object.
///
/// Reads never fail: a missing or unparsable file behaves as an empty
/// store, and `get` only touches the in-memory map.
pub struct LocalStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        LocalStore { path, values: Mutex::new(values) }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
            self.flush(&values);
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
            self.flush(&values);
        }
    }

    // Best-effort write; a failure degrades to an unsaved value, the
    // same way open tolerates a missing file.
    fn flush(&self, values: &BTreeMap<String, String>) {
        if let Ok(s) = serde_json::to_string_pretty(values) {
            let _ = fs::write(&self.path, s);
        }
    }
}
