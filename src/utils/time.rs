use chrono::NaiveDate;

/// This is the standard way of converting a date to a per-day record key.
pub fn date_to_day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Formats accumulated seconds for the status bar, e.g. "1h 27m".
/// Under an hour only the minute part is shown.
pub fn humanize_seconds(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
