use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use serde_json::Value;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::warn;

use super::entities::SessionSummary;

/// How a summary was obtained. `Defaulted` and `Recovered` both mean a fresh
/// zero-valued summary was persisted, they differ in whether there was a
/// file at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Read back from cache or disk.
    Loaded,
    /// No file existed yet, a default was written.
    Defaulted,
    /// The file existed but could not be used, a default replaced it.
    Recovered,
}

/// Durable load/save of [SessionSummary] with a read-through cache.
///
/// The file is shared across editor windows: reads take a shared lock,
/// writes an exclusive one. Write failures are logged and swallowed. The
/// cache still reflects the attempted update so reads within this process
/// stay correct even when the file is stale.
pub struct SummaryStore {
    file: PathBuf,
    cache: Option<SessionSummary>,
}

impl SummaryStore {
    pub fn new(software_dir: &Path) -> Self {
        Self {
            file: software_dir.join("sessionSummary.json"),
            cache: None,
        }
    }

    pub fn summary_file(&self) -> &Path {
        &self.file
    }

    /// Drops the in-memory copy so the next read goes back to disk. Display
    /// readers in secondary windows use this to pick up the primary's writes.
    pub fn invalidate_cache(&mut self) {
        self.cache = None;
    }

    /// Returns the current summary, constructing and persisting a zero-valued
    /// one when the file is absent or unusable.
    pub async fn load_or_init(&mut self) -> (SessionSummary, LoadOutcome) {
        if let Some(cached) = &self.cache {
            return (cached.clone(), LoadOutcome::Loaded);
        }

        let content = match self.read_locked().await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let summary = SessionSummary::default();
                self.save(&summary).await;
                return (summary, LoadOutcome::Defaulted);
            }
            Err(e) => {
                warn!("Unable to read session summary {:?}: {e}", self.file);
                let summary = SessionSummary::default();
                self.save(&summary).await;
                return (summary, LoadOutcome::Recovered);
            }
        };

        let parsed = serde_json::from_str::<Value>(&content)
            .map_err(anyhow::Error::from)
            .and_then(|mut value| {
                coalesce_missing_attributes(&mut value);
                Ok(serde_json::from_value::<SessionSummary>(value)?)
            });

        match parsed {
            Ok(summary) => {
                self.cache = Some(summary.clone());
                (summary, LoadOutcome::Loaded)
            }
            Err(e) => {
                // Might happen after shutdowns cutting off a write.
                warn!("Session summary {:?} was corrupted: {e}", self.file);
                let summary = SessionSummary::default();
                self.save(&summary).await;
                (summary, LoadOutcome::Recovered)
            }
        }
    }

    /// Cached copy if present, else whatever [Self::load_or_init] produces.
    pub async fn get(&mut self) -> SessionSummary {
        self.load_or_init().await.0
    }

    /// Serializes to disk pretty-printed and updates the cache. Summary loss
    /// is non-fatal to the editor session, so failures only log.
    pub async fn save(&mut self, summary: &SessionSummary) {
        self.cache = Some(summary.clone());

        let content = match serde_json::to_string_pretty(summary) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unable to serialize session summary: {e}");
                return;
            }
        };
        if let Err(e) = self.write_locked(content.as_bytes()).await {
            warn!("Error writing session summary {:?}: {e}", self.file);
        }
    }

    /// Day rollover: resets to a fresh zero-valued summary.
    pub async fn clear(&mut self) -> SessionSummary {
        let summary = SessionSummary::default();
        self.save(&summary).await;
        summary
    }

    /// Overwrites every key present in a server response onto the stored
    /// summary, coalescing whatever is left, and persists the result. This
    /// is how `averageDailyMinutes` becomes available locally.
    pub async fn apply_server_update(&mut self, update: &Value) -> SessionSummary {
        let current = self.get().await;
        let mut value = match serde_json::to_value(&current) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unable to apply server summary: {e}");
                return current;
            }
        };

        if let (Some(target), Some(source)) = (value.as_object_mut(), update.as_object()) {
            for (key, incoming) in source {
                target.insert(key.clone(), incoming.clone());
            }
        }

        coalesce_missing_attributes(&mut value);
        match serde_json::from_value::<SessionSummary>(value) {
            Ok(summary) => {
                self.save(&summary).await;
                summary
            }
            Err(e) => {
                warn!("Server summary did not fit the local schema: {e}");
                current
            }
        }
    }

    async fn read_locked(&self) -> Result<String, std::io::Error> {
        let mut file = File::open(&self.file).await?;
        file.lock_shared()?;
        let mut content = String::new();
        let result = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        result?;
        Ok(content)
    }

    async fn write_locked(&self, content: &[u8]) -> Result<(), std::io::Error> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.file)
            .await?;
        file.lock_exclusive()?;
        let result = async {
            file.write_all(content).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        result
    }
}

/// For every field the canonical summary defines, absent, null or negative
/// values in loaded data become 0. Guards old on-disk files against fields
/// added in later versions. Present sane fields are left untouched.
pub fn coalesce_missing_attributes(data: &mut Value) {
    let template = serde_json::to_value(SessionSummary::default())
        .unwrap_or(Value::Object(serde_json::Map::new()));

    if !data.is_object() {
        *data = template;
        return;
    }
    let Some(obj) = data.as_object_mut() else {
        return;
    };

    for key in template.as_object().into_iter().flat_map(|t| t.keys()) {
        let replace = match obj.get(key) {
            None | Some(Value::Null) => true,
            Some(v) => v.as_f64().map(|n| n < 0.0).unwrap_or(true),
        };
        if replace {
            obj.insert(key.clone(), Value::from(0));
        }
    }
}
