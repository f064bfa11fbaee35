use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use tracing::warn;

use crate::utils::time::date_to_day_key;

use super::entities::TimeData;

/// One [TimeData] bucket per calendar day, all in a single JSON map keyed by
/// day. Buckets are a historical record used for display and debugging, not
/// for the authoritative summary, so every failure degrades to zeros.
pub struct TimeDataStore {
    file: PathBuf,
}

impl TimeDataStore {
    pub fn new(software_dir: &Path) -> Self {
        Self {
            file: software_dir.join("timeData.json"),
        }
    }

    /// Today's bucket, created with zeros (and persisted) when absent.
    pub async fn today(&self, date: NaiveDate) -> TimeData {
        let mut all = self.read_all().await;
        let key = date_to_day_key(date);
        match all.get(&key) {
            Some(bucket) => *bucket,
            None => {
                let bucket = TimeData::default();
                all.insert(key, bucket);
                self.write_all(&all).await;
                bucket
            }
        }
    }

    /// Overwrites today's bucket with the provided clocks. `file_seconds` is
    /// additive by convention at the call site, not here.
    pub async fn update_time_data(
        &self,
        date: NaiveDate,
        editor_seconds: u64,
        session_seconds: u64,
        file_seconds: u64,
    ) {
        let mut all = self.read_all().await;
        all.insert(
            date_to_day_key(date),
            TimeData {
                editor_seconds,
                session_seconds,
                file_seconds,
            },
        );
        self.write_all(&all).await;
    }

    /// Bucket for an arbitrary day, if one was ever recorded.
    pub async fn data_for(&self, date: NaiveDate) -> Option<TimeData> {
        self.read_all().await.get(&date_to_day_key(date)).copied()
    }

    async fn read_all(&self) -> BTreeMap<String, TimeData> {
        match tokio::fs::read_to_string(&self.file).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Time data file {:?} was corrupted: {e}", self.file);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Unable to read time data {:?}: {e}", self.file);
                BTreeMap::new()
            }
        }
    }

    async fn write_all(&self, all: &BTreeMap<String, TimeData>) {
        let content = match serde_json::to_string_pretty(all) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unable to serialize time data: {e}");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.file, content).await {
            warn!("Unable to write time data {:?}: {e}", self.file);
        }
    }
}
