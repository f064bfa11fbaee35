use std::sync::MutexGuard;

use serde_json::json;

use crate::{
    storage::kv::{KvStore, SharedKv},
    utils::time::humanize_seconds,
};

pub const WC_TIME_KEY: &str = "wctime";

/// Accumulates real editor-active seconds for today, independent of the
/// session-minute math, as a cross-check against missed events and clock
/// tampering. Persisted in the settings store so it survives restarts
/// within the same day.
///
/// Monotonically non-decreasing within a calendar day. Only [Self::reset]
/// (day rollover) takes it back to zero.
pub struct WallClockTracker {
    kv: SharedKv,
}

impl WallClockTracker {
    pub fn new(kv: SharedKv) -> Self {
        Self { kv }
    }

    fn kv(&self) -> MutexGuard<'_, dyn KvStore + 'static> {
        self.kv.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current accumulated seconds for today.
    pub fn time_in_seconds(&self) -> u64 {
        self.kv().get_u64(WC_TIME_KEY).unwrap_or(0)
    }

    /// Unconditional overwrite. Only used when reconciling upward.
    pub fn set_time(&self, seconds: u64) {
        self.kv().set_item(WC_TIME_KEY, json!(seconds));
    }

    /// Host heartbeat: the editor was active for another chunk of real time.
    pub fn record_active_seconds(&self, seconds: u64) -> u64 {
        let updated = self.time_in_seconds() + seconds;
        self.set_time(updated);
        updated
    }

    /// Makes sure the wall clock never lags behind the session-derived
    /// seconds. When it does, it jumps one second ahead so the two displays
    /// stay distinguishable. Never decreases the stored value. Returns the
    /// effective editor seconds.
    pub fn update_based_on_session(&self, session_seconds: u64) -> u64 {
        let current = self.time_in_seconds();
        if current < session_seconds {
            let bumped = session_seconds + 1;
            self.set_time(bumped);
            bumped
        } else {
            current
        }
    }

    /// Status bar form, e.g. "1h 27m".
    pub fn humanized(&self) -> String {
        humanize_seconds(self.time_in_seconds())
    }

    /// Day rollover.
    pub fn reset(&self) {
        self.set_time(0);
    }
}
