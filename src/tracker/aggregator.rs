use std::sync::MutexGuard;

use serde_json::json;
use tracing::debug;

use crate::{
    storage::{
        entities::{KeystrokeAggregate, SessionSummary},
        kv::{KvStore, SharedKv},
        summary::SummaryStore,
        time_data::TimeDataStore,
    },
    utils::clock::Clock,
};

use super::wall_clock::WallClockTracker;

/// Fallback when the settings store carries no `sessionThresholdInSec`.
pub const DEFAULT_SESSION_THRESHOLD_SECONDS: i64 = 60 * 15;
pub const SESSION_THRESHOLD_KEY: &str = "sessionThresholdInSec";
/// End of the previous flush, epoch seconds.
pub const LAST_PAYLOAD_END_KEY: &str = "latestPayloadTimestampEndUtc";

/// Credit per flush when the gap to the previous flush can't be trusted.
/// Matches the expected flush cadence of roughly one minute.
const DEFAULT_INCREMENT_MINUTES: f64 = 1.0;

/// Tunables for the gap math. `gap_offset_seconds` is subtracted from the
/// raw gap before the threshold comparison; deployed variants of this logic
/// have used both 0 and 60.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub gap_offset_seconds: i64,
    /// Added to today's `file_seconds` bucket on every flush.
    pub file_seconds_per_flush: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            gap_offset_seconds: 0,
            file_seconds_per_flush: 60,
        }
    }
}

/// Capability to mutate the shared daily state. When several editor windows
/// track the same user, the host's window arbitration hands this to exactly
/// one of them; secondary windows only get read access for display.
pub struct PrimaryToken(());

impl PrimaryToken {
    /// The caller asserts this window won the primary designation.
    pub fn assume_primary() -> Self {
        Self(())
    }
}

/// What one flush did, for the caller and for tests.
#[derive(Debug, Clone)]
pub struct IncrementOutcome {
    pub credited_minutes: f64,
    pub summary: SessionSummary,
    /// True on the first-ever flush: local state has no history yet, so a
    /// deferred server summary fetch is worth scheduling.
    pub needs_server_refresh: bool,
}

/// The core of the tracker: folds one [KeystrokeAggregate] at a time into
/// the daily summary, keeping the session minutes, the wall clock and the
/// time buckets consistent with each other.
///
/// Owning one of these requires the [PrimaryToken]; together with the
/// single event loop in [super::module] that makes the load-mutate-save
/// sequence on the summary safe without further locking.
pub struct SessionAggregator {
    summary: SummaryStore,
    time_data: TimeDataStore,
    wall_clock: WallClockTracker,
    kv: SharedKv,
    clock: Box<dyn Clock>,
    config: AggregatorConfig,
}

impl SessionAggregator {
    pub fn new(
        _token: PrimaryToken,
        summary: SummaryStore,
        time_data: TimeDataStore,
        wall_clock: WallClockTracker,
        kv: SharedKv,
        clock: Box<dyn Clock>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            summary,
            time_data,
            wall_clock,
            kv,
            clock,
            config,
        }
    }

    fn kv(&self) -> MutexGuard<'_, dyn KvStore + 'static> {
        self.kv.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Session threshold from settings, falling back to the default.
    pub fn session_threshold_seconds(&self) -> i64 {
        self.kv()
            .get_i64(SESSION_THRESHOLD_KEY)
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_SESSION_THRESHOLD_SECONDS)
    }

    /// Minutes to credit for this flush. Gaps within the session threshold
    /// are credited as real elapsed time, which smooths flush-interval
    /// jitter without paying out long idle periods. A missing previous
    /// flush, a clock moved backwards or a gap past the threshold all fall
    /// back to the flat per-flush credit.
    fn increment_minutes(&self, now_seconds: i64) -> (f64, bool) {
        let last_payload_end = self.kv().get_i64(LAST_PAYLOAD_END_KEY);
        let Some(last_end) = last_payload_end else {
            return (DEFAULT_INCREMENT_MINUTES, true);
        };

        let gap_seconds = now_seconds - last_end - self.config.gap_offset_seconds;
        if gap_seconds > 0 && gap_seconds <= self.session_threshold_seconds() {
            (gap_seconds as f64 / 60.0, false)
        } else {
            (DEFAULT_INCREMENT_MINUTES, false)
        }
    }

    /// Folds a flush of edit counts into today's summary. See the module
    /// docs for the exact sequencing guarantees.
    pub async fn increment_session(&mut self, aggregate: &KeystrokeAggregate) -> IncrementOutcome {
        let mut summary = self.summary.get().await;
        let now_seconds = self.clock.epoch_seconds();

        let (credited_minutes, needs_server_refresh) = self.increment_minutes(now_seconds);
        summary.current_day_minutes += credited_minutes;

        let session_seconds = (summary.current_day_minutes * 60.0).round() as u64;
        // the wall-clock-derived display must never fall behind the session
        let editor_seconds = self.wall_clock.update_based_on_session(session_seconds);

        summary.current_day_keystrokes += aggregate.keystrokes;
        summary.current_day_lines_added += aggregate.lines_added;
        summary.current_day_lines_removed += aggregate.lines_removed;

        self.summary.save(&summary).await;

        let today = self.clock.today();
        let bucket = self.time_data.today(today).await;
        let file_seconds = bucket.file_seconds + self.config.file_seconds_per_flush;
        self.time_data
            .update_time_data(today, editor_seconds, session_seconds, file_seconds)
            .await;

        self.kv().set_item(LAST_PAYLOAD_END_KEY, json!(now_seconds));

        debug!(
            credited_minutes,
            session_seconds, editor_seconds, "Folded in keystroke aggregate"
        );

        IncrementOutcome {
            credited_minutes,
            summary,
            needs_server_refresh,
        }
    }

    /// Collaborative-session minutes arrive on their own path, independent
    /// of keystroke flushes.
    pub async fn set_liveshare_minutes(&mut self, minutes: f64) {
        let mut summary = self.summary.get().await;
        summary.liveshare_minutes = minutes.max(0.0);
        self.summary.save(&summary).await;
    }

    /// Day rollover: counters back to zero, time bucket history untouched.
    pub async fn roll_over_day(&mut self) -> SessionSummary {
        self.kv().remove_item(LAST_PAYLOAD_END_KEY);
        self.wall_clock.reset();
        self.summary.clear().await
    }

    pub async fn current_summary(&mut self) -> SessionSummary {
        self.summary.get().await
    }

    pub fn wall_clock(&self) -> &WallClockTracker {
        &self.wall_clock
    }

    pub(crate) fn summary_store(&mut self) -> &mut SummaryStore {
        &mut self.summary
    }

    #[cfg(test)]
    pub(crate) fn time_data_store(&self) -> &TimeDataStore {
        &self.time_data
    }
}
