use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde_json::{Map, Value};
use tracing::warn;

/// Flat key-value settings store consumed by the tracker. Keys the core
/// relies on are `latestPayloadTimestampEndUtc`, `sessionThresholdInSec`
/// and `wctime`.
pub trait KvStore: Send {
    fn get_item(&self, key: &str) -> Option<Value>;

    fn set_item(&mut self, key: &str, value: Value);

    fn remove_item(&mut self, key: &str);

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_item(key).and_then(|v| v.as_i64())
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get_item(key).and_then(|v| v.as_u64())
    }
}

/// Handle components share. All access goes through one mutex since the
/// load-modify-persist sequence is not atomic.
pub type SharedKv = Arc<Mutex<dyn KvStore>>;

pub fn into_shared(store: impl KvStore + 'static) -> SharedKv {
    Arc::new(Mutex::new(store))
}

/// The main realization of [KvStore]: a single JSON object on disk with an
/// in-memory copy, persisted on every set. A file that fails to parse is
/// replaced with an empty store.
pub struct JsonKvStore {
    file: PathBuf,
    values: Map<String, Value>,
}

impl JsonKvStore {
    pub fn load(software_dir: &Path) -> Self {
        let file = software_dir.join("settings.json");
        let values = match std::fs::read_to_string(&file) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!("Settings file {:?} was corrupted, starting over", file);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!("Unable to read settings file {:?}: {e}", file);
                Map::new()
            }
        };
        Self { file, values }
    }

    fn persist(&self) {
        let content = match serde_json::to_string_pretty(&Value::Object(self.values.clone())) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unable to serialize settings: {e}");
                return;
            }
        };
        // The in-memory copy stays correct even when the write fails, so
        // reads within this process keep working.
        if let Err(e) = std::fs::write(&self.file, content) {
            warn!("Unable to write settings file {:?}: {e}", self.file);
        }
    }
}

impl KvStore for JsonKvStore {
    fn get_item(&self, key: &str) -> Option<Value> {
        self.values.get(key).filter(|v| !v.is_null()).cloned()
    }

    fn set_item(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_owned(), value);
        self.persist();
    }

    fn remove_item(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.persist();
        }
    }
}
