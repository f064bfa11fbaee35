use serde::Deserialize;
use serde::Serialize;
use serde_json::{Map, Value};

/// Today's aggregate, one per installation. Field names stay camelCase on
/// disk so summary files written by older plugin builds keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSummary {
    /// Accumulated active minutes for the current calendar day.
    pub current_day_minutes: f64,
    /// Rolling average supplied by the server. Never computed locally.
    pub average_daily_minutes: f64,
    pub current_day_keystrokes: u64,
    pub current_day_lines_added: u64,
    pub current_day_lines_removed: u64,
    /// Minutes attributed to collaborative sessions, updated independently
    /// of the keystroke path.
    pub liveshare_minutes: f64,
    /// Server-side fields this build does not model yet. Kept so a sync
    /// response never loses keys across load/save cycles.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Counts of edits since the last flush. Produced by the editor's event
/// watcher, consumed exactly once by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct KeystrokeAggregate {
    pub keystrokes: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

/// Parallel clocks for one calendar day: real editor time, session-derived
/// time and per-flush file time. Historical record, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TimeData {
    pub editor_seconds: u64,
    pub session_seconds: u64,
    pub file_seconds: u64,
}
